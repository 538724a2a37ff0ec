//! Worker pool pulling ingestion jobs from the queue
//!
//! Each worker takes one job at a time and runs it to completion before
//! taking the next. Parallelism exists only across workers.

use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use super::coordinator::PipelineCoordinator;
use super::job_queue::{JobQueue, QueuedJob};

/// Worker for processing resume jobs in the background
pub struct IngestWorker {
    coordinator: Arc<PipelineCoordinator>,
    job_queue: JobQueue,
    worker_count: usize,
}

/// Handle to a running pool
pub struct WorkerPool {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Stop taking new jobs and wait for in-flight jobs to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for joined in join_all(self.handles).await {
            if let Err(e) = joined {
                tracing::error!("Worker task failed: {}", e);
            }
        }
        tracing::info!("Worker pool stopped");
    }
}

impl IngestWorker {
    /// Create a new worker; the count comes from the coordinator's config
    pub fn new(coordinator: Arc<PipelineCoordinator>, job_queue: JobQueue) -> Self {
        let worker_count = coordinator.config().processing.worker_count();
        Self {
            coordinator,
            job_queue,
            worker_count,
        }
    }

    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count.max(1);
        self
    }

    /// Start the pool on the given receiver
    pub fn spawn(self, receiver: mpsc::Receiver<QueuedJob>) -> WorkerPool {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let receiver = Arc::new(Mutex::new(receiver));
        let worker = Arc::new(self);

        tracing::info!("Starting {} ingestion workers", worker.worker_count);

        let handles = (0..worker.worker_count)
            .map(|index| {
                let worker = worker.clone();
                let receiver = receiver.clone();
                let shutdown = shutdown_rx.clone();
                tokio::spawn(async move { worker.run(index, receiver, shutdown).await })
            })
            .collect();

        WorkerPool { shutdown, handles }
    }

    async fn run(
        &self,
        index: usize,
        receiver: Arc<Mutex<mpsc::Receiver<QueuedJob>>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        tracing::debug!("Worker {} started", index);

        loop {
            let next = {
                let mut receiver = receiver.lock().await;
                tokio::select! {
                    queued = receiver.recv() => queued,
                    _ = shutdown.changed() => None,
                }
            };

            let Some(queued) = next else {
                break;
            };

            tracing::info!(
                "Worker {} processing job {} (attempt {})",
                index,
                queued.job.job_id,
                queued.attempt
            );
            self.handle(queued).await;
        }

        tracing::debug!("Worker {} exiting", index);
    }

    /// Run one attempt and route its outcome back to the queue
    pub async fn handle(&self, queued: QueuedJob) {
        match self.coordinator.process(&queued.job, queued.attempt).await {
            Ok(result) => {
                self.job_queue.record_result(&queued.job.job_id, result);
            }
            Err(e) => {
                self.job_queue.schedule_retry(queued, &e);
            }
        }
    }
}
