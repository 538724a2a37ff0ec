//! Cooperative cancellation registry
//!
//! The coordinator checks it at stage boundaries only. An in-flight
//! collaborator call is never interrupted, its result is just discarded.
//!
//! A candidate cancellation applies to jobs for that candidate that had
//! started when it was requested. Jobs started later run normally, so a
//! re-created candidate is not blocked by an old request.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// Cancelled job ids and candidate ids, with the time of the request
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    jobs: DashMap<String, DateTime<Utc>>,
    candidates: DashMap<String, DateTime<Utc>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel one job
    pub fn cancel_job(&self, job_id: &str) -> bool {
        tracing::info!("Cancellation requested for job {}", job_id);
        self.jobs.insert(job_id.to_string(), Utc::now()).is_none()
    }

    /// Cancel every running job for a candidate, e.g. after the candidate was deleted
    pub fn cancel_candidate(&self, candidate_id: &str) -> bool {
        tracing::info!("Cancellation requested for candidate {}", candidate_id);
        self.candidates
            .insert(candidate_id.to_string(), Utc::now())
            .is_none()
    }

    /// Reason the job should stop, if any. `started_at` is when the job's
    /// first attempt started.
    pub fn reason(
        &self,
        job_id: &str,
        candidate_id: &str,
        started_at: DateTime<Utc>,
    ) -> Option<String> {
        if self.jobs.contains_key(job_id) {
            return Some("job cancelled".to_string());
        }
        if candidate_id.is_empty() {
            return None;
        }
        match self.candidates.get(candidate_id) {
            Some(requested) if started_at <= *requested => {
                Some(format!("candidate {} cancelled", candidate_id))
            }
            _ => None,
        }
    }

    pub fn is_cancelled(&self, job_id: &str, candidate_id: &str, started_at: DateTime<Utc>) -> bool {
        self.reason(job_id, candidate_id, started_at).is_some()
    }

    /// Forget a finished job
    pub fn clear_job(&self, job_id: &str) {
        self.jobs.remove(job_id);
    }

    /// Withdraw a candidate cancellation
    pub fn clear_candidate(&self, candidate_id: &str) {
        self.candidates.remove(candidate_id);
    }

    /// Drop requests made before `cutoff`; returns how many were dropped.
    ///
    /// Called with the watchdog cutoff: every job that started before it has
    /// just been force-failed, so older requests have nothing left to stop.
    pub fn prune(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.len();
        self.jobs.retain(|_, requested| *requested >= cutoff);
        self.candidates.retain(|_, requested| *requested >= cutoff);
        before.saturating_sub(self.len())
    }

    /// Outstanding requests
    pub fn len(&self) -> usize {
        self.jobs.len() + self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_job_and_candidate_cancellation() {
        let registry = CancellationRegistry::new();
        let started = Utc::now();
        assert!(!registry.is_cancelled("job-1", "c-1", started));

        assert!(registry.cancel_job("job-1"));
        assert!(!registry.cancel_job("job-1"));
        assert_eq!(
            registry.reason("job-1", "c-1", started).as_deref(),
            Some("job cancelled")
        );
        assert!(!registry.is_cancelled("job-2", "c-1", started));

        registry.cancel_candidate("c-1");
        assert!(registry.is_cancelled("job-2", "c-1", started));
        assert!(!registry.is_cancelled("job-2", "", started));

        registry.clear_job("job-1");
        registry.clear_candidate("c-1");
        assert!(!registry.is_cancelled("job-1", "c-1", started));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_candidate_cancellation_skips_later_jobs() {
        let registry = CancellationRegistry::new();
        let running = Utc::now();
        registry.cancel_candidate("c-1");

        assert!(registry.is_cancelled("job-1", "c-1", running));
        let later = Utc::now() + Duration::seconds(5);
        assert!(!registry.is_cancelled("job-2", "c-1", later));
    }

    #[test]
    fn test_prune_drops_old_requests() {
        let registry = CancellationRegistry::new();
        registry.cancel_job("job-1");
        registry.cancel_candidate("c-1");
        assert_eq!(registry.len(), 2);

        assert_eq!(registry.prune(Utc::now() - Duration::hours(1)), 0);
        assert_eq!(registry.prune(Utc::now() + Duration::seconds(1)), 2);
        assert!(registry.is_empty());
        assert!(!registry.is_cancelled("job-1", "c-1", Utc::now() - Duration::hours(1)));
    }
}
