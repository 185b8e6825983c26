//! Write coalescing for the durable snapshot.
//!
//! Mutations request a save; requests inside one delay window collapse into a
//! single whole-file rewrite. A forced flush cancels the pending window and
//! writes immediately.

use crate::error::StoreError;
use crate::store::StoreData;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error};

#[derive(Clone, Copy, PartialEq)]
enum Phase {
    Idle,
    Pending,
    Flushing,
}

struct TimerState {
    phase: Phase,
    /// Set on every request; cleared when a write picks the data up. A write
    /// that races a mutation leaves this set, which re-arms the timer.
    dirty: bool,
    handle: Option<JoinHandle<()>>,
}

struct SchedulerShared {
    data: Arc<Mutex<StoreData>>,
    path: PathBuf,
    delay: Duration,
    timer: Mutex<TimerState>,
    /// Serializes the actual file writes when a forced flush overlaps a
    /// timer-driven one.
    write_gate: tokio::sync::Mutex<()>,
    last_saved: Mutex<Option<DateTime<Utc>>>,
    saves: AtomicU64,
}

#[derive(Clone)]
pub struct SnapshotScheduler {
    shared: Arc<SchedulerShared>,
}

impl SnapshotScheduler {
    pub(crate) fn new(data: Arc<Mutex<StoreData>>, path: PathBuf, delay: Duration) -> Self {
        Self {
            shared: Arc::new(SchedulerShared {
                data,
                path,
                delay,
                timer: Mutex::new(TimerState {
                    phase: Phase::Idle,
                    dirty: false,
                    handle: None,
                }),
                write_gate: tokio::sync::Mutex::new(()),
                last_saved: Mutex::new(None),
                saves: AtomicU64::new(0),
            }),
        }
    }

    /// Throttled save request. Arms the delay timer if none is outstanding;
    /// otherwise just marks the store dirty. Returns immediately.
    pub fn request(&self) {
        let mut timer = self.shared.timer.lock().unwrap();
        timer.dirty = true;
        if timer.phase == Phase::Idle {
            timer.phase = Phase::Pending;
            timer.handle = Some(self.spawn_timer());
        }
    }

    /// Forced save. Cancels any pending timer, writes now, and reports the
    /// outcome to the caller.
    pub async fn flush(&self) -> Result<(), StoreError> {
        {
            let mut timer = self.shared.timer.lock().unwrap();
            if let Some(handle) = timer.handle.take() {
                handle.abort();
            }
            timer.phase = Phase::Flushing;
            timer.dirty = false;
        }
        let result = self.write_snapshot().await;
        self.finish();
        result
    }

    pub fn last_saved(&self) -> Option<DateTime<Utc>> {
        *self.shared.last_saved.lock().unwrap()
    }

    /// Number of completed durable writes since startup.
    pub(crate) fn save_count(&self) -> u64 {
        self.shared.saves.load(Ordering::Relaxed)
    }

    fn spawn_timer(&self) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(scheduler.shared.delay).await;
            scheduler.timer_fired().await;
        })
    }

    async fn timer_fired(&self) {
        {
            let mut timer = self.shared.timer.lock().unwrap();
            if timer.phase != Phase::Pending {
                // A forced flush got here first and took the write with it.
                return;
            }
            timer.phase = Phase::Flushing;
            timer.dirty = false;
            timer.handle = None;
        }
        if let Err(e) = self.write_snapshot().await {
            error!("Scheduled snapshot write failed: {}", e);
        }
        self.finish();
    }

    fn finish(&self) {
        let mut timer = self.shared.timer.lock().unwrap();
        timer.phase = Phase::Idle;
        if timer.dirty {
            // A mutation landed after the write serialized the store.
            timer.phase = Phase::Pending;
            timer.handle = Some(self.spawn_timer());
        }
    }

    async fn write_snapshot(&self) -> Result<(), StoreError> {
        let _gate = self.shared.write_gate.lock().await;

        let bytes = {
            let data = self.shared.data.lock().unwrap();
            data.to_json()?
        };

        let path = &self.shared.path;
        let io_err = |source| StoreError::Write {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
            }
        }

        // Whole-file rewrite, made atomic by staging next to the target.
        let staging = PathBuf::from(format!("{}.tmp", path.display()));
        tokio::fs::write(&staging, &bytes).await.map_err(io_err)?;
        tokio::fs::rename(&staging, path).await.map_err(io_err)?;

        *self.shared.last_saved.lock().unwrap() = Some(Utc::now());
        self.shared.saves.fetch_add(1, Ordering::Relaxed);
        debug!("Snapshot written: {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Snapshot;

    fn scheduler(tag: &str, delay_ms: u64) -> (SnapshotScheduler, PathBuf) {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "tallycord-persist-{}-{}.json",
            tag,
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        let data = Arc::new(Mutex::new(StoreData::from_snapshot(Snapshot::default())));
        (
            SnapshotScheduler::new(data, path.clone(), Duration::from_millis(delay_ms)),
            path,
        )
    }

    #[tokio::test]
    async fn test_requests_coalesce_into_one_write() {
        let (scheduler, path) = scheduler("coalesce", 50);

        for _ in 0..50 {
            scheduler.request();
        }
        assert_eq!(scheduler.save_count(), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(scheduler.save_count(), 1);
        assert!(path.exists());

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_flush_cancels_pending_timer() {
        let (scheduler, path) = scheduler("flush-cancel", 100);

        scheduler.request();
        scheduler.flush().await.unwrap();
        assert_eq!(scheduler.save_count(), 1);

        // The armed timer must not fire a second write.
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(scheduler.save_count(), 1);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_new_request_after_write_opens_new_window() {
        let (scheduler, path) = scheduler("rearm", 40);

        scheduler.request();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(scheduler.save_count(), 1);

        // New mutation after the write: a fresh window, a second write.
        scheduler.request();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(scheduler.save_count(), 2);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_last_saved_updates() {
        let (scheduler, path) = scheduler("last-saved", 20);

        assert!(scheduler.last_saved().is_none());
        scheduler.flush().await.unwrap();
        assert!(scheduler.last_saved().is_some());

        let _ = std::fs::remove_file(&path);
    }
}
