//! Pipeline status store
//!
//! Concurrent map from job id to its current status. Writes for one job are
//! serialized through the map's per-key entry lock, unrelated jobs proceed in
//! parallel. Terminal statuses are write-once: any later write for the same
//! job id is rejected without an error.
//!
//! Every accepted change is broadcast to subscribers, and written through to
//! SQLite when a database is attached.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::storage::IngestDb;
use crate::types::{PipelineStage, PipelineStatus};

const EVENT_CAPACITY: usize = 256;

/// Status counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusStats {
    pub total: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Concurrent status store
pub struct StatusStore {
    statuses: DashMap<String, PipelineStatus>,
    events: broadcast::Sender<PipelineStatus>,
    database: Option<Arc<IngestDb>>,
}

impl Default for StatusStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusStore {
    /// In-memory store
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            statuses: DashMap::new(),
            events,
            database: None,
        }
    }

    /// Store that writes through to the database, preloaded with persisted statuses
    pub fn with_database(database: Arc<IngestDb>) -> Result<Self> {
        let persisted = database.list_pipeline_statuses()?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let statuses = DashMap::new();
        for status in persisted {
            statuses.insert(status.job_id.clone(), status);
        }

        tracing::info!("Loaded {} pipeline statuses from database", statuses.len());

        Ok(Self {
            statuses,
            events,
            database: Some(database),
        })
    }

    /// Insert or replace a status. Returns false when the stored status is terminal.
    pub fn upsert(&self, job_id: &str, status: PipelineStatus) -> bool {
        self.update(job_id, move |_| Some(status)).is_some()
    }

    /// Atomically derive the next status from the current one.
    ///
    /// `apply` sees the current status (if any) and returns the replacement,
    /// or `None` to leave it untouched. It is never called when the stored
    /// status is terminal. Returns the written status.
    ///
    /// The write-through and the broadcast happen while the entry lock is
    /// held, so subscribers and the database see one job's changes in the
    /// order they were applied.
    pub fn update<F>(&self, job_id: &str, apply: F) -> Option<PipelineStatus>
    where
        F: FnOnce(Option<&PipelineStatus>) -> Option<PipelineStatus>,
    {
        match self.statuses.entry(job_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_terminal() {
                    tracing::debug!(
                        "Rejected status write for job {}: already {}",
                        job_id,
                        occupied.get().stage
                    );
                    return None;
                }
                let next = apply(Some(occupied.get()))?;
                occupied.insert(next.clone());
                self.publish(&next);
                Some(next)
            }
            Entry::Vacant(vacant) => {
                let next = apply(None)?;
                let stored = vacant.insert(next.clone());
                self.publish(&stored);
                Some(next)
            }
        }
    }

    fn publish(&self, status: &PipelineStatus) {
        self.persist(status);
        let _ = self.events.send(status.clone());
    }

    fn persist(&self, status: &PipelineStatus) {
        if let Some(ref db) = self.database {
            if let Err(e) = db.upsert_pipeline_status(status) {
                tracing::error!("Failed to persist status for job {}: {}", status.job_id, e);
            }
        }
    }

    pub fn get(&self, job_id: &str) -> Option<PipelineStatus> {
        self.statuses.get(job_id).map(|s| s.clone())
    }

    /// All statuses, oldest first
    pub fn list(&self) -> Vec<PipelineStatus> {
        let mut all: Vec<PipelineStatus> = self.statuses.iter().map(|s| s.clone()).collect();
        all.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        all
    }

    /// Non-terminal statuses whose job started before `cutoff`
    pub fn stalled_since(&self, cutoff: DateTime<Utc>) -> Vec<PipelineStatus> {
        self.statuses
            .iter()
            .filter(|s| !s.is_terminal() && s.started_at < cutoff)
            .map(|s| s.clone())
            .collect()
    }

    /// Receive every accepted status change
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineStatus> {
        self.events.subscribe()
    }

    pub fn stats(&self) -> StatusStats {
        let mut stats = StatusStats::default();
        for status in self.statuses.iter() {
            stats.total += 1;
            match status.stage {
                PipelineStage::Completed => stats.completed += 1,
                PipelineStage::Failed => stats.failed += 1,
                _ => stats.active += 1,
            }
        }
        stats
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_status_is_write_once() {
        let store = StatusStore::new();
        let started = PipelineStatus::started("job-1", "c-1", 1);

        assert!(store.upsert("job-1", started.clone()));
        assert!(store.upsert("job-1", started.advanced_to(35)));
        assert!(store.upsert("job-1", started.completed("done")));

        assert!(!store.upsert("job-1", started.advanced_to(40)));
        assert!(!store.upsert("job-1", started.failed("late failure")));

        let stored = store.get("job-1").unwrap();
        assert_eq!(stored.stage, PipelineStage::Completed);
        assert_eq!(stored.progress, 100);
    }

    #[test]
    fn test_update_sees_current_status() {
        let store = StatusStore::new();
        assert!(store.update("job-1", |current| {
            assert!(current.is_none());
            None
        })
        .is_none());
        assert!(store.get("job-1").is_none());
        assert!(store.is_empty());

        store.upsert("job-1", PipelineStatus::started("job-1", "c-1", 1));
        let written = store.update("job-1", |current| current.map(|s| s.advanced_to(20)));
        assert_eq!(written.unwrap().progress, 20);
    }

    #[test]
    fn test_stats_and_stalled() {
        let store = StatusStore::new();
        let a = PipelineStatus::started("a", "c-1", 1);
        let b = PipelineStatus::started("b", "c-2", 1);
        store.upsert("a", a.clone());
        store.upsert("b", b.clone());
        store.upsert("b", b.failed("boom"));

        assert_eq!(
            store.stats(),
            StatusStats {
                total: 2,
                active: 1,
                completed: 0,
                failed: 1
            }
        );

        let cutoff = Utc::now() + chrono::Duration::seconds(1);
        let stalled = store.stalled_since(cutoff);
        assert_eq!(stalled.len(), 1);
        assert_eq!(stalled[0].job_id, "a");
        assert!(store.stalled_since(a.started_at).is_empty());
    }

    #[tokio::test]
    async fn test_subscribers_receive_accepted_changes() {
        let store = StatusStore::new();
        let mut events = store.subscribe();

        let started = PipelineStatus::started("job-1", "c-1", 1);
        store.upsert("job-1", started.clone());
        store.upsert("job-1", started.completed("done"));
        store.upsert("job-1", started.advanced_to(40));

        assert_eq!(events.recv().await.unwrap().progress, 5);
        assert_eq!(events.recv().await.unwrap().stage, PipelineStage::Completed);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_write_through_and_reload() {
        let db = Arc::new(IngestDb::in_memory().unwrap());
        {
            let store = StatusStore::with_database(db.clone()).unwrap();
            let started = PipelineStatus::started("job-1", "c-1", 1);
            store.upsert("job-1", started.clone());
            store.upsert("job-1", started.advanced_to(60));
        }

        let reloaded = StatusStore::with_database(db).unwrap();
        let status = reloaded.get("job-1").unwrap();
        assert_eq!(status.progress, 60);
        assert_eq!(status.stage, PipelineStage::Storage);
    }

    #[test]
    fn test_concurrent_writers_on_distinct_jobs() {
        let store = Arc::new(StatusStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let job_id = format!("job-{}", i);
                    let started = PipelineStatus::started(&job_id, "c", 1);
                    store.upsert(&job_id, started.clone());
                    for p in [20u8, 40, 60, 80] {
                        store.upsert(&job_id, started.advanced_to(p));
                    }
                    store.upsert(&job_id, started.completed("done"));
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.stats().completed, 8);
    }

    #[test]
    fn test_events_for_one_job_arrive_in_write_order() {
        let db = Arc::new(IngestDb::in_memory().unwrap());
        let store = Arc::new(StatusStore::with_database(db.clone()).unwrap());
        let mut events = store.subscribe();
        store.upsert("job-1", PipelineStatus::started("job-1", "c-1", 1));

        let handles: Vec<_> = (0..4u8)
            .map(|offset| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for step in 0..20u8 {
                        let percent = 10 + step * 4 + offset;
                        store.update("job-1", |current| {
                            let current = current?;
                            (percent > current.progress).then(|| current.advanced_to(percent))
                        });
                    }
                    if offset == 0 {
                        store.update("job-1", |current| current.map(|s| s.failed("stalled")));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let mut seen = Vec::new();
        while let Ok(status) = events.try_recv() {
            seen.push(status);
        }

        let progress: Vec<u8> = seen.iter().map(|s| s.progress).collect();
        assert!(progress.windows(2).all(|pair| pair[0] <= pair[1]), "{:?}", progress);

        let last = seen.last().unwrap();
        assert_eq!(last.stage, PipelineStage::Failed);
        assert!(seen[..seen.len() - 1].iter().all(|s| !s.is_terminal()));
        assert_eq!(db.get_pipeline_status("job-1").unwrap().as_ref(), Some(last));
        assert_eq!(store.get("job-1").as_ref(), Some(last));
    }
}
