use crate::scanner::ScanOptions;
use chrono::{FixedOffset, Offset, Utc};
use dotenvy::dotenv;
use std::env;
use tokio::time::Duration;
use tracing::warn;

#[derive(Clone)]
pub struct Config {
    pub discord_token: String,
    pub target_guild_id: u64,
    pub owner_id: Option<u64>,
    pub mod_role_id: Option<u64>,
    pub webhook_url: Option<String>,
    pub admin_webhook_url: Option<String>,
    pub data_file: String,
    pub save_debounce: Duration,
    pub scan_concurrency: usize,
    pub scan_page_size: usize,
    pub scan_max_per_channel: usize,
    pub scan_buffer_limit: usize,
    pub scan_page_delay: Duration,
    pub scan_wave_delay: Duration,
    /// Daily report wall-clock time (hour, minute) in the reference zone.
    pub daily_report_time: (u32, u32),
    /// Fixed reference time zone for all calendar-day arithmetic.
    pub report_offset: FixedOffset,
    pub skip_initial_scan: bool,
    pub status_message: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> anyhow::Result<Self> {
        Ok(Config {
            discord_token: env::var("DISCORD_TOKEN")
                .map_err(|_| anyhow::anyhow!("DISCORD_TOKEN must be set"))?,
            target_guild_id: env::var("TARGET_GUILD_ID")
                .map_err(|_| anyhow::anyhow!("TARGET_GUILD_ID must be set"))?
                .parse()
                .map_err(|_| anyhow::anyhow!("TARGET_GUILD_ID must be a valid u64"))?,
            owner_id: env::var("OWNER_ID").ok().and_then(|id| id.parse().ok()),
            mod_role_id: env::var("MOD_ROLE_ID").ok().and_then(|id| id.parse().ok()),
            webhook_url: env::var("WEBHOOK_URL").ok().filter(|url| !url.is_empty()),
            admin_webhook_url: env::var("ADMIN_WEBHOOK_URL")
                .ok()
                .filter(|url| !url.is_empty()),
            data_file: env::var("DATA_FILE").unwrap_or_else(|_| "data/tallycord.json".to_string()),
            save_debounce: duration_var("SAVE_DEBOUNCE", Duration::from_secs(5)),
            scan_concurrency: env::var("SCAN_CONCURRENCY")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .unwrap_or(2),
            scan_page_size: env::var("SCAN_PAGE_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .unwrap_or(100),
            scan_max_per_channel: env::var("SCAN_MAX_PER_CHANNEL")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .unwrap_or(3000),
            scan_buffer_limit: env::var("SCAN_BUFFER_LIMIT")
                .unwrap_or_else(|_| "500".to_string())
                .parse()
                .unwrap_or(500),
            scan_page_delay: duration_var("SCAN_PAGE_DELAY", Duration::from_millis(300)),
            scan_wave_delay: duration_var("SCAN_WAVE_DELAY", Duration::from_secs(1)),
            daily_report_time: report_time_var(),
            report_offset: offset_var(),
            skip_initial_scan: env::var("SKIP_INITIAL_SCAN")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            status_message: env::var("STATUS_MESSAGE")
                .unwrap_or_else(|_| "Counting messages".to_string()),
        })
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            concurrency: self.scan_concurrency,
            page_size: self.scan_page_size,
            max_per_channel: self.scan_max_per_channel,
            buffer_limit: self.scan_buffer_limit,
            page_delay: self.scan_page_delay,
            wave_delay: self.scan_wave_delay,
        }
    }
}

fn duration_var(name: &str, default: Duration) -> Duration {
    env::var(name)
        .ok()
        .and_then(|raw| humantime::parse_duration(&raw).ok())
        .unwrap_or(default)
}

fn report_time_var() -> (u32, u32) {
    let raw = env::var("DAILY_REPORT_TIME").unwrap_or_else(|_| "23:59".to_string());
    match parse_report_time(&raw) {
        Some(time) => time,
        None => {
            warn!("Invalid DAILY_REPORT_TIME '{}', using 23:59", raw);
            (23, 59)
        }
    }
}

fn parse_report_time(raw: &str) -> Option<(u32, u32)> {
    let (hours, minutes) = raw.split_once(':')?;
    let hours: u32 = hours.trim().parse().ok()?;
    let minutes: u32 = minutes.trim().parse().ok()?;
    (hours < 24 && minutes < 60).then_some((hours, minutes))
}

fn offset_var() -> FixedOffset {
    let minutes: i32 = env::var("REPORT_UTC_OFFSET_MINUTES")
        .unwrap_or_else(|_| "0".to_string())
        .parse()
        .unwrap_or(0);
    FixedOffset::east_opt(minutes * 60).unwrap_or_else(|| {
        warn!("REPORT_UTC_OFFSET_MINUTES {} out of range, using UTC", minutes);
        Utc.fix()
    })
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"[REDACTED]")
            .field("target_guild_id", &self.target_guild_id)
            .field("owner_id", &self.owner_id)
            .field("mod_role_id", &self.mod_role_id)
            .field(
                "webhook_url",
                &self.webhook_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "admin_webhook_url",
                &self.admin_webhook_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("data_file", &self.data_file)
            .field("save_debounce", &self.save_debounce)
            .field("scan_concurrency", &self.scan_concurrency)
            .field("scan_page_size", &self.scan_page_size)
            .field("scan_max_per_channel", &self.scan_max_per_channel)
            .field("scan_buffer_limit", &self.scan_buffer_limit)
            .field("scan_page_delay", &self.scan_page_delay)
            .field("scan_wave_delay", &self.scan_wave_delay)
            .field("daily_report_time", &self.daily_report_time)
            .field("report_offset", &self.report_offset)
            .field("skip_initial_scan", &self.skip_initial_scan)
            .field("status_message", &self.status_message)
            .finish()
    }
}

/// Discord message limit is 2000 characters
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;
/// Embed description limit is 4096 characters
pub const DISCORD_EMBED_LIMIT: usize = 4096;
