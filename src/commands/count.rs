use crate::commands::{moderator_ids, resolve_day, truncate};
use crate::config::DISCORD_EMBED_LIMIT;
use crate::queries;
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use std::collections::HashMap;

/// Message count queries
#[poise::command(
    slash_command,
    guild_only,
    check = "crate::commands::has_access",
    subcommands("total", "user", "channel", "mods", "split")
)]
pub async fn count(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Total messages on a day
#[poise::command(slash_command)]
pub async fn total(
    ctx: Context<'_>,
    #[description = "Date (DD/MM/YYYY), defaults to today"] date: Option<String>,
) -> Result<(), Error> {
    let day = match resolve_day(date.as_deref(), ctx.data().config.report_offset) {
        Ok(day) => day,
        Err(msg) => {
            ctx.say(format!("❌ {}", msg)).await?;
            return Ok(());
        }
    };

    let guild_id = ctx.data().config.target_guild_id.to_string();
    let count = queries::count_messages(&ctx.data().store, Some(&guild_id), Some(day));

    let embed = serenity::CreateEmbed::new()
        .title("📊 Total Messages")
        .description(format!(
            "Total messages on {}: **{}**",
            day.date().format("%d/%m/%Y"),
            count
        ))
        .color(0x00ff00);
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Messages by one user
#[poise::command(slash_command)]
pub async fn user(
    ctx: Context<'_>,
    #[description = "User to count messages for"] user: serenity::User,
    #[description = "Date (DD/MM/YYYY), defaults to today"] date: Option<String>,
    #[description = "Restrict to one channel"] channel: Option<serenity::ChannelId>,
) -> Result<(), Error> {
    let day = match resolve_day(date.as_deref(), ctx.data().config.report_offset) {
        Ok(day) => day,
        Err(msg) => {
            ctx.say(format!("❌ {}", msg)).await?;
            return Ok(());
        }
    };

    let guild_id = ctx.data().config.target_guild_id.to_string();
    let channel_id = channel.map(|c| c.to_string());
    let count = queries::count_user_messages(
        &ctx.data().store,
        &guild_id,
        &user.id.to_string(),
        Some(day),
        channel_id.as_deref(),
    );

    let scope = match &channel_id {
        Some(id) => format!(" in <#{}>", id),
        None => String::new(),
    };
    let embed = serenity::CreateEmbed::new()
        .title(format!("📊 Messages by {}", user.name))
        .description(format!(
            "Messages on {}{}: **{}**",
            day.date().format("%d/%m/%Y"),
            scope,
            count
        ))
        .color(0x00ff00);
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Messages in one channel
#[poise::command(slash_command)]
pub async fn channel(
    ctx: Context<'_>,
    #[description = "Channel to count messages in"] channel: serenity::ChannelId,
    #[description = "Date (DD/MM/YYYY), defaults to today"] date: Option<String>,
) -> Result<(), Error> {
    let day = match resolve_day(date.as_deref(), ctx.data().config.report_offset) {
        Ok(day) => day,
        Err(msg) => {
            ctx.say(format!("❌ {}", msg)).await?;
            return Ok(());
        }
    };

    let count =
        queries::count_channel_messages(&ctx.data().store, &channel.to_string(), Some(day));

    let embed = serenity::CreateEmbed::new()
        .title("📊 Channel Messages")
        .description(format!(
            "Messages in <#{}> on {}: **{}**",
            channel,
            day.date().format("%d/%m/%Y"),
            count
        ))
        .color(0x00ff00);
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Moderator activity breakdown
#[poise::command(slash_command)]
pub async fn mods(
    ctx: Context<'_>,
    #[description = "Date (DD/MM/YYYY), defaults to today"] date: Option<String>,
) -> Result<(), Error> {
    let day = match resolve_day(date.as_deref(), ctx.data().config.report_offset) {
        Ok(day) => day,
        Err(msg) => {
            ctx.say(format!("❌ {}", msg)).await?;
            return Ok(());
        }
    };

    ctx.defer().await?;
    let mod_ids = moderator_ids(&ctx).await?;
    if mod_ids.is_empty() {
        ctx.say("❌ No members hold the moderator role.").await?;
        return Ok(());
    }

    let guild_id = ctx.data().config.target_guild_id.to_string();
    let breakdown = queries::moderator_breakdown(&ctx.data().store, &guild_id, &mod_ids, day);
    if breakdown.is_empty() {
        ctx.say(format!(
            "No moderator messages found on {}.",
            day.date().format("%d/%m/%Y")
        ))
        .await?;
        return Ok(());
    }

    // Roll the (moderator, channel) groups up per moderator, keeping the
    // top channels for each.
    struct UserStats {
        name: String,
        total: usize,
        deleted: usize,
        channels: Vec<(String, usize)>,
    }
    let mut stats: Vec<UserStats> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut total = 0usize;
    for group in &breakdown {
        let idx = *index.entry(group.author_id.clone()).or_insert_with(|| {
            stats.push(UserStats {
                name: group.author_name.clone(),
                total: 0,
                deleted: 0,
                channels: Vec::new(),
            });
            stats.len() - 1
        });
        stats[idx].total += group.count;
        stats[idx].deleted += group.deleted_count;
        stats[idx]
            .channels
            .push((group.channel_id.clone(), group.count));
        total += group.count;
    }
    stats.sort_by(|a, b| b.total.cmp(&a.total));

    let mut description = format!("**Total Moderator Messages:** {}\n\n", total);
    for entry in &stats {
        description.push_str(&format!("**{}**: {} messages", entry.name, entry.total));
        if entry.deleted > 0 {
            description.push_str(&format!(" ({} deleted)", entry.deleted));
        }
        description.push('\n');
        let mut channels = entry.channels.clone();
        channels.sort_by(|a, b| b.1.cmp(&a.1));
        for (channel_id, count) in channels.iter().take(3) {
            description.push_str(&format!("  • <#{}>: {}\n", channel_id, count));
        }
    }

    let embed = serenity::CreateEmbed::new()
        .title(format!(
            "📊 Moderator Activity - {}",
            day.date().format("%d/%m/%Y")
        ))
        .description(truncate(&description, DISCORD_EMBED_LIMIT))
        .color(0x3498db);
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Moderator vs member message split
#[poise::command(slash_command)]
pub async fn split(
    ctx: Context<'_>,
    #[description = "Date (DD/MM/YYYY), defaults to today"] date: Option<String>,
    #[description = "Restrict to one channel"] channel: Option<serenity::ChannelId>,
) -> Result<(), Error> {
    let day = match resolve_day(date.as_deref(), ctx.data().config.report_offset) {
        Ok(day) => day,
        Err(msg) => {
            ctx.say(format!("❌ {}", msg)).await?;
            return Ok(());
        }
    };

    ctx.defer().await?;
    let mod_ids = moderator_ids(&ctx).await?;
    let guild_id = ctx.data().config.target_guild_id.to_string();
    let channel_id = channel.map(|c| c.to_string());
    let split = queries::mod_member_split(
        &ctx.data().store,
        &guild_id,
        &mod_ids,
        day,
        channel_id.as_deref(),
    );

    let scope = match &channel_id {
        Some(id) => format!(" in <#{}>", id),
        None => String::new(),
    };
    let embed = serenity::CreateEmbed::new()
        .title("📊 Moderator vs Member Messages")
        .description(format!(
            "On {}{}:\n• **Moderators:** {}\n• **Members:** {}",
            day.date().format("%d/%m/%Y"),
            scope,
            split.mod_count,
            split.member_count
        ))
        .color(0x3498db);
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}
