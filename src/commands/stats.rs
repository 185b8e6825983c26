use crate::commands::truncate;
use crate::config::DISCORD_EMBED_LIMIT;
use crate::queries;
use crate::{Context, Error};
use poise::serenity_prelude as serenity;

/// Show database statistics
#[poise::command(slash_command, guild_only, check = "crate::commands::is_owner")]
pub async fn dbstats(ctx: Context<'_>) -> Result<(), Error> {
    ctx.defer().await?;

    // Exact numbers want the snapshot on disk first.
    ctx.data().store.flush().await?;
    let stats = ctx.data().store.stats();
    let channels = queries::counts_by_channel(&ctx.data().store);

    let mut channel_lines: String = channels
        .iter()
        .map(|(name, count)| format!("• #{}: {} messages", name, count))
        .collect::<Vec<_>>()
        .join("\n");
    if channel_lines.is_empty() {
        channel_lines = "No channel data available".to_string();
    }

    let last_save = stats
        .last_saved
        .map(|t| t.format("%d/%m/%Y %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "Never".to_string());

    let description = format!(
        "**Total Messages:** {}\n\
         **Allowed Users:** {}\n\
         **Database Size:** {:.2} MB ({:.1} KB)\n\
         **Last Save:** {}\n\n\
         **Messages by Channel:**\n{}",
        stats.messages,
        stats.allowed_users,
        stats.snapshot_bytes as f64 / (1024.0 * 1024.0),
        stats.snapshot_bytes as f64 / 1024.0,
        last_save,
        channel_lines
    );

    let embed = serenity::CreateEmbed::new()
        .title("📊 Database Statistics")
        .description(truncate(&description, DISCORD_EMBED_LIMIT))
        .color(0x3498db);
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}
