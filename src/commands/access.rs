use crate::{Context, Error};
use poise::serenity_prelude as serenity;

/// Manage who may use the bot's commands
#[poise::command(
    slash_command,
    guild_only,
    check = "crate::commands::is_owner",
    subcommands("add", "remove", "list")
)]
pub async fn access(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Allow a user to run commands
#[poise::command(slash_command)]
pub async fn add(
    ctx: Context<'_>,
    #[description = "User to allow"] user: serenity::User,
) -> Result<(), Error> {
    ctx.data()
        .store
        .add_allowed(&user.id.to_string(), &user.name);
    ctx.say(format!("✅ **{}** can now use bot commands.", user.name))
        .await?;
    Ok(())
}

/// Revoke a user's command access
#[poise::command(slash_command)]
pub async fn remove(
    ctx: Context<'_>,
    #[description = "User to remove"] user: serenity::User,
) -> Result<(), Error> {
    if ctx.data().store.remove_allowed(&user.id.to_string()) {
        ctx.say(format!("✅ **{}** was removed from the access list.", user.name))
            .await?;
    } else {
        ctx.say(format!("**{}** was not on the access list.", user.name))
            .await?;
    }
    Ok(())
}

/// List all allowed users
#[poise::command(slash_command)]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    let users = ctx.data().store.list_allowed();
    if users.is_empty() {
        ctx.say("No users are on the access list.").await?;
        return Ok(());
    }

    let lines: Vec<String> = users
        .iter()
        .map(|user| {
            format!(
                "• **{}** (<@{}>), added {}",
                user.display_name,
                user.user_id,
                user.added_at.format("%d/%m/%Y")
            )
        })
        .collect();

    let embed = serenity::CreateEmbed::new()
        .title("🔑 Allowed Users")
        .description(lines.join("\n"))
        .color(0x3498db);
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}
