use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tallycord::commands::{access, count, scan, stats};
use tallycord::config::Config;
use tallycord::report::DailyReporter;
use tallycord::scanner::Scanner;
use tallycord::source::{self, DiscordSource};
use tallycord::store::MessageStore;
use tallycord::webhook::WebhookClient;
use tallycord::Data;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Load configuration
    let config = Config::from_env()?;
    let discord_token = config.discord_token.clone();

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                count::count(),
                access::access(),
                scan::scan(),
                stats::dbstats(),
            ],
            event_handler: |ctx, event, _framework, data| {
                Box::pin(async move {
                    handle_event(ctx, event, data);
                    Ok(())
                })
            },
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                info!("Gateway session established");
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                ctx.set_activity(Some(serenity::ActivityData::custom(&config.status_message)));

                let store = MessageStore::open(&config.data_file, config.save_debounce).await?;
                let webhook = WebhookClient::new(
                    reqwest::Client::new(),
                    config.webhook_url.clone(),
                    config.admin_webhook_url.clone(),
                );
                let guild_id = serenity::GuildId::new(config.target_guild_id);

                let reporter = DailyReporter::new(
                    store.clone(),
                    webhook.clone(),
                    ctx.http.clone(),
                    guild_id,
                    config.mod_role_id.map(serenity::RoleId::new),
                    config.daily_report_time,
                    config.report_offset,
                );
                tokio::spawn(reporter.run());

                if config.skip_initial_scan {
                    info!("Skipping initial server scan as per configuration");
                    announce_ready(&webhook, &ctx.http, guild_id, None).await;
                } else {
                    let source = Arc::new(DiscordSource::new(ctx.http.clone(), guild_id));
                    let scanner =
                        Scanner::new(source, store.clone(), config.scan_options());
                    let announce = webhook.clone();
                    let http = ctx.http.clone();
                    tokio::spawn(async move {
                        match scanner.scan_guild(&guild_id.to_string()).await {
                            Ok(report) => {
                                info!("Initial scan finished: {} messages", report.total);
                                announce_ready(&announce, &http, guild_id, Some(report.total))
                                    .await;
                            }
                            Err(e) => error!("Initial scan failed: {}", e),
                        }
                    });
                }

                Ok(Data {
                    config,
                    store,
                    webhook,
                })
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::GUILD_MEMBERS;

    let mut client = serenity::ClientBuilder::new(&discord_token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    info!("Starting bot...");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}

/// Posts the readiness embed to both webhook sinks, admin first. Sent after
/// the initial backfill, or right away when the scan is skipped.
async fn announce_ready(
    webhook: &WebhookClient,
    http: &serenity::Http,
    guild_id: serenity::GuildId,
    scanned: Option<usize>,
) {
    let guild_name = guild_id
        .to_partial_guild(http)
        .await
        .map(|guild| guild.name)
        .unwrap_or_else(|_| guild_id.to_string());
    let description = match scanned {
        Some(total) => format!(
            "The bot has scanned all existing messages in **{}** ({} total) \
             and is now fully operational.",
            guild_name, total
        ),
        None => format!(
            "The bot has started in **{}** and is now fully operational.",
            guild_name
        ),
    };
    for admin in [true, false] {
        if let Err(e) = webhook
            .send_embed(
                "✅ BOT READY TO USE",
                &description,
                Vec::new(),
                0x00ff00,
                admin,
            )
            .await
        {
            error!("Failed to announce readiness: {}", e);
        }
    }
}

/// Maps gateway events from the monitored guild onto store operations.
fn handle_event(ctx: &serenity::Context, event: &serenity::FullEvent, data: &Data) {
    let target = data.config.target_guild_id;
    match event {
        serenity::FullEvent::Message { new_message } => {
            let Some(guild_id) = new_message.guild_id else {
                return;
            };
            if guild_id.get() != target {
                return;
            }
            let channel_name = ctx
                .cache
                .channel(new_message.channel_id)
                .map(|channel| channel.name.clone())
                .unwrap_or_else(|| new_message.channel_id.to_string());
            data.store
                .upsert(source::record_from_gateway(new_message, guild_id, channel_name));
        }
        serenity::FullEvent::MessageDelete {
            deleted_message_id,
            guild_id,
            ..
        } => {
            if guild_id.map(|g| g.get()) != Some(target) {
                return;
            }
            data.store.mark_deleted(&deleted_message_id.to_string());
        }
        serenity::FullEvent::ChannelDelete { channel, .. } => {
            if channel.guild_id.get() != target {
                return;
            }
            info!("Channel #{} deleted, flagging its messages", channel.name);
            data.store.mark_channel_deleted(&channel.id.to_string());
        }
        _ => {}
    }
}
