use crate::commands::truncate;
use crate::config::DISCORD_EMBED_LIMIT;
use crate::scanner::Scanner;
use crate::source::DiscordSource;
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing::error;

/// Rescan the monitored server's full message history
#[poise::command(slash_command, guild_only, check = "crate::commands::is_owner")]
pub async fn scan(ctx: Context<'_>) -> Result<(), Error> {
    ctx.defer().await?;

    let data = ctx.data();
    let guild_id = serenity::GuildId::new(data.config.target_guild_id);
    let source = Arc::new(DiscordSource::new(
        ctx.serenity_context().http.clone(),
        guild_id,
    ));
    let scanner = Scanner::new(source, data.store.clone(), data.config.scan_options());

    match scanner.scan_guild(&guild_id.to_string()).await {
        Ok(report) => {
            let embed = serenity::CreateEmbed::new()
                .title("✅ Scan Complete")
                .description(truncate(&report.summary(), DISCORD_EMBED_LIMIT))
                .color(0x00ff00);
            ctx.send(poise::CreateReply::default().embed(embed)).await?;

            let announcement = format!("Server scan completed: **{}** messages.", report.total);
            if let Err(e) = data
                .webhook
                .send_embed("✅ Scan Complete", &announcement, Vec::new(), 0x00ff00, true)
                .await
            {
                error!("Failed to announce scan completion: {}", e);
            }
        }
        Err(e) => {
            error!("Manual scan failed: {}", e);
            ctx.say(format!("❌ Server scan failed: {}", e)).await?;
        }
    }
    Ok(())
}
