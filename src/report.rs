//! Daily moderator activity report.
//!
//! A background task wakes at the configured wall-clock time in the
//! reference zone, aggregates yesterday's moderator activity, and posts the
//! formatted report through the webhook sink.

use crate::config::DISCORD_MESSAGE_LIMIT;
use crate::queries::{self, LocalDay, ModeratorChannelCount};
use crate::store::MessageStore;
use crate::webhook::WebhookClient;
use chrono::{FixedOffset, NaiveDate, NaiveTime, Utc};
use serenity::http::Http;
use serenity::model::id::{GuildId, RoleId, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{error, info, warn};

pub struct DailyReporter {
    store: MessageStore,
    webhook: WebhookClient,
    http: Arc<Http>,
    guild_id: GuildId,
    mod_role_id: Option<RoleId>,
    report_time: (u32, u32),
    offset: FixedOffset,
}

impl DailyReporter {
    pub fn new(
        store: MessageStore,
        webhook: WebhookClient,
        http: Arc<Http>,
        guild_id: GuildId,
        mod_role_id: Option<RoleId>,
        report_time: (u32, u32),
        offset: FixedOffset,
    ) -> Self {
        Self {
            store,
            webhook,
            http,
            guild_id,
            mod_role_id,
            report_time,
            offset,
        }
    }

    pub async fn run(self) {
        loop {
            let wait = until_next_run(self.offset, self.report_time);
            info!(
                "Next daily report in {}",
                humantime::format_duration(Duration::from_secs(wait.as_secs()))
            );
            tokio::time::sleep(wait).await;
            if let Err(e) = self.send_daily_report().await {
                error!("Daily report failed: {}", e);
            }
        }
    }

    pub async fn send_daily_report(&self) -> anyhow::Result<()> {
        let Some(role_id) = self.mod_role_id else {
            warn!("MOD_ROLE_ID not configured, skipping daily report");
            return Ok(());
        };
        let mod_ids = fetch_role_member_ids(&self.http, self.guild_id, role_id).await?;
        if mod_ids.is_empty() {
            warn!("No members hold the moderator role, skipping daily report");
            return Ok(());
        }

        let day = LocalDay::yesterday(self.offset);
        let breakdown =
            queries::moderator_breakdown(&self.store, &self.guild_id.to_string(), &mod_ids, day);
        if breakdown.is_empty() {
            info!("No moderator activity found for {}", day.date());
            return Ok(());
        }

        let guild_name = self
            .guild_id
            .to_partial_guild(&self.http)
            .await
            .map(|guild| guild.name)
            .unwrap_or_else(|_| self.guild_id.to_string());

        let report = format_daily_report(&guild_name, day.date(), &breakdown);
        for chunk in split_message(&report, DISCORD_MESSAGE_LIMIT - 100) {
            self.webhook.send_message(&chunk, false).await?;
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        info!("Daily report sent for {}", day.date());
        Ok(())
    }
}

/// Sleep time until the next occurrence of `HH:MM` in the reference zone.
fn until_next_run(offset: FixedOffset, (hours, minutes): (u32, u32)) -> Duration {
    let now = Utc::now().with_timezone(&offset);
    let at = NaiveTime::from_hms_opt(hours, minutes, 0).unwrap_or(NaiveTime::MIN);
    let mut next = now.date_naive().and_time(at);
    if next <= now.naive_local() {
        next += chrono::Duration::days(1);
    }
    (next - now.naive_local()).to_std().unwrap_or_default()
}

/// Ids of all guild members holding `role_id`, via paginated member listing.
pub async fn fetch_role_member_ids(
    http: &Http,
    guild_id: GuildId,
    role_id: RoleId,
) -> anyhow::Result<Vec<String>> {
    const PAGE: u64 = 1000;
    let mut ids = Vec::new();
    let mut after: Option<UserId> = None;
    loop {
        let members = guild_id.members(http, Some(PAGE), after).await?;
        let Some(last) = members.last() else {
            break;
        };
        after = Some(last.user.id);
        let page_len = members.len();
        for member in members {
            if member.roles.contains(&role_id) {
                ids.push(member.user.id.to_string());
            }
        }
        if (page_len as u64) < PAGE {
            break;
        }
    }
    Ok(ids)
}

/// Renders the report the way it is posted: moderator totals with deleted
/// counts and per-channel lines, then a channel summary and footer totals.
pub fn format_daily_report(
    guild_name: &str,
    date: NaiveDate,
    breakdown: &[ModeratorChannelCount],
) -> String {
    struct ModTotals {
        name: String,
        total: usize,
        deleted: usize,
        channels: Vec<(String, usize)>,
    }

    let mut mods: Vec<ModTotals> = Vec::new();
    let mut mod_index: HashMap<String, usize> = HashMap::new();
    let mut channel_totals: Vec<(String, usize)> = Vec::new();
    let mut channel_index: HashMap<String, usize> = HashMap::new();
    let mut total = 0usize;
    let mut total_deleted = 0usize;

    for group in breakdown {
        let idx = *mod_index
            .entry(group.author_id.clone())
            .or_insert_with(|| {
                mods.push(ModTotals {
                    name: group.author_name.clone(),
                    total: 0,
                    deleted: 0,
                    channels: Vec::new(),
                });
                mods.len() - 1
            });
        mods[idx].total += group.count;
        mods[idx].deleted += group.deleted_count;
        mods[idx]
            .channels
            .push((group.channel_name.clone(), group.count));

        let cidx = *channel_index
            .entry(group.channel_name.clone())
            .or_insert_with(|| {
                channel_totals.push((group.channel_name.clone(), 0));
                channel_totals.len() - 1
            });
        channel_totals[cidx].1 += group.count;

        total += group.count;
        total_deleted += group.deleted_count;
    }

    mods.sort_by(|a, b| b.total.cmp(&a.total));
    channel_totals.sort_by(|a, b| b.1.cmp(&a.1));

    let mut report = format!(
        "📊 **Daily Moderator Report - {}**\n**Server:** {}\n\n",
        date.format("%d/%m/%Y"),
        guild_name
    );

    report.push_str("**👮 Moderator Activity:**\n");
    for entry in &mods {
        report.push_str(&format!("• **{}**: {} messages", entry.name, entry.total));
        if entry.deleted > 0 {
            report.push_str(&format!(" ({} deleted)", entry.deleted));
        }
        report.push('\n');
        let mut channels = entry.channels.clone();
        channels.sort_by(|a, b| b.1.cmp(&a.1));
        for (name, count) in channels {
            report.push_str(&format!("  └ #{}: {}\n", name, count));
        }
    }

    report.push_str("\n**📋 Channel Summary:**\n");
    for (name, count) in &channel_totals {
        report.push_str(&format!("• #{}: {} messages\n", name, count));
    }

    if total_deleted > 0 {
        report.push_str(&format!("\n**🗑️ Deleted Messages:** {}\n", total_deleted));
    }
    report.push_str(&format!("\n**📊 Total Messages:** {}", total));
    report
}

/// Splits on line boundaries so no chunk exceeds `max_length`.
pub fn split_message(text: &str, max_length: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in text.split('\n') {
        if !current.is_empty() && current.len() + line.len() + 1 > max_length {
            chunks.push(std::mem::take(&mut current));
        }
        if current.is_empty() {
            current.push_str(line);
        } else {
            current.push('\n');
            current.push_str(line);
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
