//! Dispatcher queue for resume ingestion jobs
//!
//! Jobs go through a bounded channel to the worker pool. A job whose attempt
//! comes back as `Err` is re-enqueued with exponential backoff and the next
//! attempt number. Terminal results are kept by job id.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

use crate::config::ProcessingConfig;
use crate::error::{Error, Result};
use crate::types::{JobIntake, ProcessingJob, ProcessingResult};

/// A job together with the attempt it is about to run
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub job: ProcessingJob,
    /// 1-based
    pub attempt: u32,
}

/// Queue statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Jobs accepted by `submit`
    pub submitted: usize,
    /// Jobs not yet finished, including those waiting for a retry
    pub pending: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Re-enqueued attempts
    pub retried: usize,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    retried: AtomicUsize,
}

/// Job queue feeding the worker pool
#[derive(Clone)]
pub struct JobQueue {
    /// Channel for sending jobs to workers
    sender: mpsc::Sender<QueuedJob>,
    /// Terminal results by job id
    results: Arc<DashMap<String, ProcessingResult>>,
    /// Jobs submitted but not yet finished
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
    counters: Arc<Counters>,
    config: ProcessingConfig,
}

impl JobQueue {
    /// Create a new job queue and the receiver the workers pull from
    pub fn new(config: &ProcessingConfig) -> (Self, mpsc::Receiver<QueuedJob>) {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));

        let queue = Self {
            sender,
            results: Arc::new(DashMap::new()),
            pending: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
            counters: Arc::new(Counters::default()),
            config: config.clone(),
        };

        (queue, receiver)
    }

    /// Submit a dispatcher intake; returns the job id
    pub async fn submit(&self, intake: JobIntake) -> Result<String> {
        self.submit_job(ProcessingJob::from_intake(intake)).await
    }

    /// Submit a prepared job for its first attempt
    pub async fn submit_job(&self, job: ProcessingJob) -> Result<String> {
        let job_id = job.job_id.clone();
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.counters.submitted.fetch_add(1, Ordering::SeqCst);

        if let Err(e) = self.sender.send(QueuedJob { job, attempt: 1 }).await {
            tracing::error!("Failed to submit job {}: {}", job_id, e);
            self.finish();
            return Err(Error::Internal(format!("Job queue closed: {}", e)));
        }

        tracing::info!("Queued job {}", job_id);
        Ok(job_id)
    }

    /// Record a terminal result for a job
    pub fn record_result(&self, job_id: &str, result: ProcessingResult) {
        if result.success {
            self.counters.succeeded.fetch_add(1, Ordering::SeqCst);
        } else {
            self.counters.failed.fetch_add(1, Ordering::SeqCst);
        }
        self.results.insert(job_id.to_string(), result);
        self.finish();
    }

    /// Re-enqueue a job after a retryable failure.
    ///
    /// The next attempt is sent after `retry_delay(attempt)`. A job that has
    /// used all its attempts, or that cannot be re-enqueued, is recorded as
    /// failed here so it never goes missing.
    pub fn schedule_retry(&self, queued: QueuedJob, err: &Error) {
        let QueuedJob { job, attempt } = queued;

        if attempt >= self.config.max_attempts {
            tracing::error!(
                "Job {} exhausted {} attempts: {}",
                job.job_id,
                attempt,
                err
            );
            let result = ProcessingResult::failure(job.candidate_id(), err.to_string(), 0);
            self.record_result(&job.job_id, result);
            return;
        }

        let delay = self.config.retry_delay(attempt);
        self.counters.retried.fetch_add(1, Ordering::SeqCst);
        tracing::warn!(
            "Retrying job {} in {}ms (attempt {} of {}): {}",
            job.job_id,
            delay.as_millis(),
            attempt + 1,
            self.config.max_attempts,
            err
        );

        let queue = self.clone();
        let error = err.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let job_id = job.job_id.clone();
            let candidate_id = job.candidate_id().to_string();
            let next = QueuedJob {
                job,
                attempt: attempt + 1,
            };

            if let Err(e) = queue.sender.send(next).await {
                tracing::error!("Failed to re-enqueue job {}: {}", job_id, e);
                queue.record_result(
                    &job_id,
                    ProcessingResult::failure(candidate_id, error, 0),
                );
            }
        });
    }

    fn finish(&self) {
        let previous = self
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)))
            .unwrap_or(0);
        if previous <= 1 {
            self.idle.notify_waiters();
        }
    }

    /// Terminal result for a job, if it has finished
    pub fn result(&self, job_id: &str) -> Option<ProcessingResult> {
        self.results.get(job_id).map(|r| r.clone())
    }

    /// Remove and return a job's terminal result. Callers that collect every
    /// result should use this so the registry does not grow without bound.
    pub fn take_result(&self, job_id: &str) -> Option<ProcessingResult> {
        self.results.remove(job_id).map(|(_, result)| result)
    }

    /// All recorded results
    pub fn results(&self) -> Vec<(String, ProcessingResult)> {
        self.results
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Get queue statistics
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            submitted: self.counters.submitted.load(Ordering::SeqCst),
            pending: self.pending.load(Ordering::SeqCst),
            succeeded: self.counters.succeeded.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
            retried: self.counters.retried.load(Ordering::SeqCst),
        }
    }

    /// Wait until every submitted job has a terminal result
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn intake(job_id: &str) -> JobIntake {
        JobIntake {
            job_id: Some(job_id.to_string()),
            candidate_id: Some("c-1".to_string()),
            file_path: Some("/uploads/cv.pdf".to_string()),
            original_name: "cv.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            ..Default::default()
        }
    }

    fn fast_config() -> ProcessingConfig {
        ProcessingConfig {
            retry_backoff_ms: 1,
            max_attempts: 3,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_submit_and_record() {
        let (queue, mut receiver) = JobQueue::new(&fast_config());

        let job_id = queue.submit(intake("job-1")).await.unwrap();
        assert_eq!(job_id, "job-1");
        assert_eq!(queue.stats().pending, 1);

        let queued = receiver.recv().await.unwrap();
        assert_eq!(queued.attempt, 1);
        assert_eq!(queued.job.candidate_id(), "c-1");

        queue.record_result("job-1", ProcessingResult::success("c-1", 10));
        queue.wait_idle().await;

        let stats = queue.stats();
        assert_eq!(stats.submitted, 1);
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.succeeded, 1);
        assert!(queue.result("job-1").unwrap().success);
    }

    #[tokio::test]
    async fn test_take_result_drains_registry() {
        let (queue, _receiver) = JobQueue::new(&fast_config());
        queue.submit(intake("job-1")).await.unwrap();
        queue.record_result("job-1", ProcessingResult::success("c-1", 10));

        assert!(queue.take_result("job-1").unwrap().success);
        assert!(queue.take_result("job-1").is_none());
        assert!(queue.results().is_empty());
        assert_eq!(queue.stats().succeeded, 1);
    }

    #[tokio::test]
    async fn test_retry_increments_attempt() {
        let (queue, mut receiver) = JobQueue::new(&fast_config());
        queue.submit(intake("job-1")).await.unwrap();

        let first = receiver.recv().await.unwrap();
        queue.schedule_retry(first, &Error::rate_limited("429"));

        let second = tokio::time::timeout(Duration::from_secs(5), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.attempt, 2);
        assert_eq!(queue.stats().retried, 1);
        assert_eq!(queue.stats().pending, 1);
    }

    #[tokio::test]
    async fn test_exhausted_retry_records_failure() {
        let (queue, _receiver) = JobQueue::new(&fast_config());
        queue.submit(intake("job-1")).await.unwrap();

        let job = ProcessingJob::from_intake(intake("job-1"));
        queue.schedule_retry(QueuedJob { job, attempt: 3 }, &Error::rate_limited("429"));

        queue.wait_idle().await;
        let result = queue.result("job-1").unwrap();
        assert!(!result.success);
        assert_eq!(queue.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_submit_to_closed_queue() {
        let (queue, receiver) = JobQueue::new(&fast_config());
        drop(receiver);

        let err = queue.submit(intake("job-1")).await.unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
        assert_eq!(queue.stats().pending, 0);
    }

    #[test]
    fn test_wait_idle_returns_immediately_when_empty() {
        let (queue, _receiver) = JobQueue::new(&fast_config());
        tokio_test::block_on(queue.wait_idle());
    }
}
