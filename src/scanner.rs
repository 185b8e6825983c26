//! Historical backfill of channel messages.
//!
//! Channels are scanned in waves of bounded concurrency; within a channel,
//! history pages are walked backward behind a cursor. One broken channel
//! never takes down its wave-mates or the run.

use crate::error::FetchError;
use crate::model::MessageRecord;
use crate::store::MessageStore;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Clone, Debug)]
pub struct ChannelRef {
    pub id: String,
    pub name: String,
}

/// Upstream history access. The gateway-backed implementation lives in
/// `source`; tests substitute an in-memory fake.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Text channels of the guild that are worth scanning.
    async fn list_channels(&self, guild_id: &str) -> Result<Vec<ChannelRef>, FetchError>;

    /// One page of channel history, newest first, at most `limit` entries,
    /// strictly older than `before` when given.
    async fn fetch_page(
        &self,
        channel: &ChannelRef,
        before: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, FetchError>;
}

#[derive(Clone, Debug)]
pub struct ScanOptions {
    /// Channels scanned concurrently per wave.
    pub concurrency: usize,
    /// History page size; 100 is the most the API hands out.
    pub page_size: usize,
    /// Hard cap per channel against unbounded history.
    pub max_per_channel: usize,
    /// Buffered records before a batch write into the store.
    pub buffer_limit: usize,
    pub page_delay: Duration,
    pub wave_delay: Duration,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            concurrency: 2,
            page_size: 100,
            max_per_channel: 3000,
            buffer_limit: 500,
            page_delay: Duration::from_millis(300),
            wave_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Clone, Debug)]
pub enum ChannelOutcome {
    Scanned(usize),
    /// Access denied; the channel is left out without being retried.
    Skipped,
    /// The scan aborted part-way; the partial count is already in the store.
    Failed { scanned: usize, error: String },
}

#[derive(Clone, Debug)]
pub struct ChannelReport {
    pub channel: ChannelRef,
    pub outcome: ChannelOutcome,
}

#[derive(Debug)]
pub struct ScanReport {
    pub total: usize,
    pub channels: Vec<ChannelReport>,
    pub elapsed: Duration,
}

impl ScanReport {
    /// Per-channel outcome lines for command replies and logs.
    pub fn summary(&self) -> String {
        let mut lines = Vec::with_capacity(self.channels.len() + 1);
        for report in &self.channels {
            let line = match &report.outcome {
                ChannelOutcome::Scanned(n) => {
                    format!("#{}: scanned {}", report.channel.name, n)
                }
                ChannelOutcome::Skipped => {
                    format!("#{}: skipped (no access)", report.channel.name)
                }
                ChannelOutcome::Failed { scanned, error } => {
                    format!("#{}: error after {}: {}", report.channel.name, scanned, error)
                }
            };
            lines.push(line);
        }
        lines.push(format!(
            "Total: {} messages in {}",
            self.total,
            humantime::format_duration(Duration::from_secs(self.elapsed.as_secs()))
        ));
        lines.join("\n")
    }
}

pub struct Scanner {
    source: Arc<dyn MessageSource>,
    store: MessageStore,
    options: ScanOptions,
}

impl Scanner {
    pub fn new(source: Arc<dyn MessageSource>, store: MessageStore, options: ScanOptions) -> Self {
        Self {
            source,
            store,
            options,
        }
    }

    /// Backfills every eligible channel of the guild. Individual channel
    /// failures are isolated into the report; only channel enumeration can
    /// fail the run as a whole.
    pub async fn scan_guild(&self, guild_id: &str) -> Result<ScanReport, FetchError> {
        let started = Instant::now();
        let mut channels = self.source.list_channels(guild_id).await?;
        // Deterministic ordering across runs.
        channels.sort_by(|a, b| a.name.cmp(&b.name));
        info!(
            "Starting scan of {} channels in guild {}",
            channels.len(),
            guild_id
        );

        let concurrency = self.options.concurrency.max(1);
        let wave_count = channels.len().div_ceil(concurrency);
        let mut reports: Vec<ChannelReport> = Vec::with_capacity(channels.len());
        let mut total = 0usize;

        for (wave_idx, wave) in channels.chunks(concurrency).enumerate() {
            let mut tasks = JoinSet::new();
            for channel in wave {
                let channel = channel.clone();
                let source = self.source.clone();
                let store = self.store.clone();
                let options = self.options.clone();
                tasks.spawn(async move {
                    let outcome = scan_channel(source.as_ref(), &store, &channel, &options).await;
                    ChannelReport { channel, outcome }
                });
            }

            // Let the whole wave settle; one bad channel does not cancel the
            // others.
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(report) => {
                        match &report.outcome {
                            ChannelOutcome::Scanned(n) => {
                                info!("Scanned {} messages from #{}", n, report.channel.name);
                                total += n;
                            }
                            ChannelOutcome::Skipped => {
                                info!("Missing access to #{}, skipped", report.channel.name);
                            }
                            ChannelOutcome::Failed { scanned, error } => {
                                warn!(
                                    "Scan of #{} failed after {} messages: {}",
                                    report.channel.name, scanned, error
                                );
                                total += scanned;
                            }
                        }
                        reports.push(report);
                    }
                    Err(e) => error!("Scan worker crashed: {}", e),
                }
            }

            // Crash mid-run loses at most one wave of progress.
            if let Err(e) = self.store.flush().await {
                error!("Post-wave snapshot write failed: {}", e);
            }
            if wave_idx + 1 < wave_count {
                tokio::time::sleep(self.options.wave_delay).await;
            }
        }

        reports.sort_by(|a, b| a.channel.name.cmp(&b.channel.name));
        let elapsed = started.elapsed();
        info!(
            "Scan complete for guild {}: {} messages in {:.1}s",
            guild_id,
            total,
            elapsed.as_secs_f64()
        );
        Ok(ScanReport {
            total,
            channels: reports,
            elapsed,
        })
    }
}

async fn scan_channel(
    source: &dyn MessageSource,
    store: &MessageStore,
    channel: &ChannelRef,
    options: &ScanOptions,
) -> ChannelOutcome {
    let mut scanned = 0usize;
    let mut buffer: Vec<MessageRecord> = Vec::new();
    let mut before: Option<String> = None;

    loop {
        let page = match source
            .fetch_page(channel, before.as_deref(), options.page_size)
            .await
        {
            Ok(page) => page,
            Err(FetchError::AccessDenied) => {
                if !buffer.is_empty() {
                    store.upsert_batch(buffer);
                }
                return ChannelOutcome::Skipped;
            }
            Err(e) => {
                if !buffer.is_empty() {
                    store.upsert_batch(buffer);
                }
                return ChannelOutcome::Failed {
                    scanned,
                    error: e.to_string(),
                };
            }
        };

        if page.is_empty() {
            break;
        }
        let end_of_history = page.len() < options.page_size;
        // Cursor from the oldest entry, taken before the cap trim.
        before = page.last().map(|r| r.id.clone());

        let mut page = page;
        let room = options.max_per_channel - scanned;
        if page.len() > room {
            page.truncate(room);
        }
        scanned += page.len();
        buffer.extend(page);

        if buffer.len() >= options.buffer_limit || end_of_history {
            let outcome = store.upsert_batch(std::mem::take(&mut buffer));
            debug!(
                "#{}: wrote batch ({} new, {} rescanned)",
                channel.name, outcome.inserted, outcome.updated
            );
        }

        if end_of_history || scanned >= options.max_per_channel {
            break;
        }
        tokio::time::sleep(options.page_delay).await;
    }

    if !buffer.is_empty() {
        store.upsert_batch(buffer);
    }
    ChannelOutcome::Scanned(scanned)
}
