//! In-memory message store with an eventually-durable JSON snapshot.
//!
//! The store is the single source of truth for queries; durability is
//! best-effort and delegated to [`SnapshotScheduler`]. Records are kept in
//! insertion order with an id index for upserts.

use crate::error::StoreError;
use crate::model::{AllowedUser, MessageRecord};
use crate::persist::SnapshotScheduler;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::time::Duration;
use tracing::{debug, info};

/// Durable form of the whole store, rewritten as one JSON document.
#[derive(Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Snapshot {
    pub records: Vec<MessageRecord>,
    pub allowed_users: Vec<AllowedUser>,
}

pub(crate) struct StoreData {
    snapshot: Snapshot,
    by_id: HashMap<String, usize>,
}

impl StoreData {
    pub(crate) fn from_snapshot(snapshot: Snapshot) -> Self {
        let by_id = snapshot
            .records
            .iter()
            .enumerate()
            .map(|(idx, record)| (record.id.clone(), idx))
            .collect();
        Self { snapshot, by_id }
    }

    pub(crate) fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(&self.snapshot)
    }

    /// Insert or replace by id. Returns true when an existing record was
    /// replaced.
    fn put(&mut self, record: MessageRecord) -> bool {
        if let Some(&idx) = self.by_id.get(&record.id) {
            self.snapshot.records[idx] = record;
            true
        } else {
            self.by_id
                .insert(record.id.clone(), self.snapshot.records.len());
            self.snapshot.records.push(record);
            false
        }
    }
}

/// Split of an `upsert_batch` by whether each id already existed.
#[derive(Debug, Default, Clone, Copy)]
pub struct BatchOutcome {
    pub inserted: usize,
    pub updated: usize,
}

#[derive(Debug, Clone)]
pub struct StoreStats {
    pub messages: usize,
    pub allowed_users: usize,
    pub snapshot_bytes: usize,
    pub last_saved: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct MessageStore {
    data: Arc<Mutex<StoreData>>,
    saver: SnapshotScheduler,
}

impl MessageStore {
    /// Loads the snapshot at `path`, or starts empty (and writes the file
    /// right away) when it does not exist yet.
    pub async fn open(path: impl Into<PathBuf>, save_delay: Duration) -> anyhow::Result<Self> {
        let path = path.into();
        let loaded = match tokio::fs::read(&path).await {
            Ok(bytes) => Some(
                serde_json::from_slice::<Snapshot>(&bytes)
                    .with_context(|| format!("corrupt snapshot at {}", path.display()))?,
            ),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()))
            }
        };

        let fresh = loaded.is_none();
        let snapshot = loaded.unwrap_or_default();
        let data = Arc::new(Mutex::new(StoreData::from_snapshot(snapshot)));
        let saver = SnapshotScheduler::new(data.clone(), path.clone(), save_delay);
        let store = Self { data, saver };

        if fresh {
            info!("Creating new data file at {}", path.display());
            store.flush().await?;
        } else {
            let stats = store.stats();
            info!(
                "Loaded {} messages and {} allowed users from {}",
                stats.messages,
                stats.allowed_users,
                path.display()
            );
        }
        Ok(store)
    }

    /// Inserts or replaces one record and requests a throttled save. Never
    /// blocks on disk; persistence errors surface in the scheduler's log.
    pub fn upsert(&self, record: MessageRecord) {
        {
            let mut data = self.data.lock().unwrap();
            data.put(record);
        }
        self.saver.request();
    }

    /// Same as repeated `upsert` but with a single save request for the
    /// whole batch.
    pub fn upsert_batch(&self, records: Vec<MessageRecord>) -> BatchOutcome {
        if records.is_empty() {
            return BatchOutcome::default();
        }
        let mut outcome = BatchOutcome::default();
        {
            let mut data = self.data.lock().unwrap();
            for record in records {
                if data.put(record) {
                    outcome.updated += 1;
                } else {
                    outcome.inserted += 1;
                }
            }
        }
        self.saver.request();
        outcome
    }

    /// Flags the record as removed at the source. Unknown ids are tolerated:
    /// the deletion may have been observed before the creation ever was.
    pub fn mark_deleted(&self, id: &str) {
        let changed = {
            let mut data = self.data.lock().unwrap();
            match data.by_id.get(id).copied() {
                Some(idx) => {
                    data.snapshot.records[idx].deleted = true;
                    true
                }
                None => false,
            }
        };
        if changed {
            self.saver.request();
        } else {
            debug!("mark_deleted: no record with id {}", id);
        }
    }

    /// Flags every record in the channel as belonging to a removed channel.
    pub fn mark_channel_deleted(&self, channel_id: &str) {
        let changed = {
            let mut data = self.data.lock().unwrap();
            let mut any = false;
            for record in &mut data.snapshot.records {
                if record.channel_id == channel_id {
                    record.channel_deleted = true;
                    any = true;
                }
            }
            any
        };
        if changed {
            self.saver.request();
        }
    }

    pub fn is_allowed(&self, user_id: &str) -> bool {
        let data = self.data.lock().unwrap();
        data.snapshot
            .allowed_users
            .iter()
            .any(|u| u.user_id == user_id)
    }

    /// Adds (or refreshes) an access-list entry.
    pub fn add_allowed(&self, user_id: &str, display_name: &str) {
        {
            let mut data = self.data.lock().unwrap();
            let entry = AllowedUser {
                user_id: user_id.to_string(),
                display_name: display_name.to_string(),
                added_at: Utc::now(),
            };
            match data
                .snapshot
                .allowed_users
                .iter_mut()
                .find(|u| u.user_id == user_id)
            {
                Some(existing) => *existing = entry,
                None => data.snapshot.allowed_users.push(entry),
            }
        }
        self.saver.request();
    }

    /// Removes an access-list entry if present. Returns whether it existed.
    pub fn remove_allowed(&self, user_id: &str) -> bool {
        let removed = {
            let mut data = self.data.lock().unwrap();
            let before = data.snapshot.allowed_users.len();
            data.snapshot.allowed_users.retain(|u| u.user_id != user_id);
            data.snapshot.allowed_users.len() != before
        };
        if removed {
            self.saver.request();
        }
        removed
    }

    /// All access-list entries, ordered by display name (case-insensitive).
    pub fn list_allowed(&self) -> Vec<AllowedUser> {
        let data = self.data.lock().unwrap();
        let mut users = data.snapshot.allowed_users.clone();
        users.sort_by(|a, b| {
            a.display_name
                .to_lowercase()
                .cmp(&b.display_name.to_lowercase())
        });
        users
    }

    pub fn stats(&self) -> StoreStats {
        let data = self.data.lock().unwrap();
        StoreStats {
            messages: data.snapshot.records.len(),
            allowed_users: data.snapshot.allowed_users.len(),
            snapshot_bytes: data.to_json().map(|b| b.len()).unwrap_or(0),
            last_saved: self.saver.last_saved(),
        }
    }

    /// Forces an immediate durable write and reports its outcome.
    pub async fn flush(&self) -> Result<(), StoreError> {
        self.saver.flush().await
    }

    /// Runs `f` over the current record set under the store lock. The query
    /// engine's scans go through here; `f` must not block.
    pub fn with_messages<R>(&self, f: impl FnOnce(&[MessageRecord]) -> R) -> R {
        let data = self.data.lock().unwrap();
        f(&data.snapshot.records)
    }

    #[cfg(test)]
    pub(crate) fn save_count(&self) -> u64 {
        self.saver.save_count()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::WEBHOOK_DISCRIMINATOR;
    use chrono::TimeZone;

    pub(crate) fn temp_store_path(tag: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "tallycord-store-{}-{}.json",
            tag,
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        path
    }

    pub(crate) async fn open_temp(tag: &str) -> MessageStore {
        MessageStore::open(temp_store_path(tag), Duration::from_millis(30))
            .await
            .unwrap()
    }

    pub(crate) fn record(id: &str, author_id: &str, channel_id: &str) -> MessageRecord {
        MessageRecord {
            id: id.to_string(),
            author_id: author_id.to_string(),
            author_name: format!("user-{}", author_id),
            author_discriminator: "0001".to_string(),
            channel_id: channel_id.to_string(),
            channel_name: format!("chan-{}", channel_id),
            guild_id: "g1".to_string(),
            content: "hello".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            is_bot: false,
            deleted: false,
            channel_deleted: false,
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_by_id() {
        let store = open_temp("idempotent").await;

        let mut first = record("1", "u1", "c1");
        first.content = "first".to_string();
        store.upsert(first);

        let mut second = record("1", "u1", "c1");
        second.content = "second".to_string();
        store.upsert(second);

        assert_eq!(store.stats().messages, 1);
        let content = store.with_messages(|records| records[0].content.clone());
        assert_eq!(content, "second");
    }

    #[tokio::test]
    async fn test_upsert_batch_splits_inserted_and_updated() {
        let store = open_temp("batch").await;
        store.upsert(record("1", "u1", "c1"));

        let outcome = store.upsert_batch(vec![
            record("1", "u1", "c1"),
            record("2", "u1", "c1"),
            record("3", "u2", "c1"),
        ]);
        assert_eq!(outcome.updated, 1);
        assert_eq!(outcome.inserted, 2);
        assert_eq!(store.stats().messages, 3);
    }

    #[tokio::test]
    async fn test_mark_deleted_keeps_record() {
        let store = open_temp("soft-delete").await;
        store.upsert(record("1", "u1", "c1"));

        store.mark_deleted("1");
        assert_eq!(store.stats().messages, 1);
        assert!(store.with_messages(|records| records[0].deleted));

        // Unknown id: tolerated, nothing changes.
        store.mark_deleted("missing");
        assert_eq!(store.stats().messages, 1);
    }

    #[tokio::test]
    async fn test_mark_channel_deleted_is_retroactive() {
        let store = open_temp("channel-delete").await;
        store.upsert(record("1", "u1", "c1"));
        store.upsert(record("2", "u2", "c1"));
        store.upsert(record("3", "u1", "c2"));

        store.mark_channel_deleted("c1");

        let flagged = store.with_messages(|records| {
            records
                .iter()
                .filter(|r| r.channel_deleted)
                .map(|r| r.id.clone())
                .collect::<Vec<_>>()
        });
        assert_eq!(flagged, vec!["1".to_string(), "2".to_string()]);
    }

    #[tokio::test]
    async fn test_allowed_users_sorted_case_insensitive() {
        let store = open_temp("allowed").await;
        store.add_allowed("10", "zoe");
        store.add_allowed("11", "Adam");
        store.add_allowed("12", "bob");

        let names: Vec<String> = store
            .list_allowed()
            .into_iter()
            .map(|u| u.display_name)
            .collect();
        assert_eq!(names, vec!["Adam", "bob", "zoe"]);

        assert!(store.is_allowed("10"));
        assert!(store.remove_allowed("10"));
        assert!(!store.remove_allowed("10"));
        assert!(!store.is_allowed("10"));
    }

    #[tokio::test]
    async fn test_add_allowed_is_upsert() {
        let store = open_temp("allowed-upsert").await;
        store.add_allowed("10", "old name");
        store.add_allowed("10", "new name");

        let users = store.list_allowed();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].display_name, "new name");
    }

    #[tokio::test]
    async fn test_snapshot_roundtrip() {
        let path = temp_store_path("roundtrip");
        {
            let store = MessageStore::open(&path, Duration::from_millis(30))
                .await
                .unwrap();
            let mut relay = record("2", "hook", "c1");
            relay.author_discriminator = WEBHOOK_DISCRIMINATOR.to_string();
            store.upsert(record("1", "u1", "c1"));
            store.upsert(relay);
            store.add_allowed("10", "alice");
            store.mark_deleted("1");
            store.flush().await.unwrap();
        }

        let reopened = MessageStore::open(&path, Duration::from_millis(30))
            .await
            .unwrap();
        let stats = reopened.stats();
        assert_eq!(stats.messages, 2);
        assert_eq!(stats.allowed_users, 1);
        assert!(stats.snapshot_bytes > 0);
        assert!(reopened.with_messages(|records| records[0].deleted));

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_rapid_upserts_one_durable_write() {
        let store = MessageStore::open(temp_store_path("throttle"), Duration::from_millis(200))
            .await
            .unwrap();
        let baseline = store.save_count();

        for i in 0..50 {
            store.upsert(record(&i.to_string(), "u1", "c1"));
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(store.save_count(), baseline + 1);
    }

    #[tokio::test]
    async fn test_missing_file_initializes_and_writes() {
        let path = temp_store_path("fresh");
        let store = MessageStore::open(&path, Duration::from_millis(30))
            .await
            .unwrap();
        assert_eq!(store.stats().messages, 0);
        assert!(path.exists());
        assert!(store.stats().last_saved.is_some());

        let _ = std::fs::remove_file(&path);
    }
}
