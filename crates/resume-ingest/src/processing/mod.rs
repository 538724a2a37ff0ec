//! Background processing: coordinator, status tracking, queue and workers

mod cancellation;
mod classifier;
mod coordinator;
mod job_queue;
mod status_store;
mod watchdog;
mod worker;

pub use cancellation::CancellationRegistry;
pub use classifier::{classify, classify_kind, Classification};
pub use coordinator::{sync_work_experience, Clock, PipelineCoordinator, StartOutcome};
pub use job_queue::{JobQueue, QueueStats, QueuedJob};
pub use status_store::{StatusStats, StatusStore};
pub use watchdog::spawn_watchdog;
pub use worker::{IngestWorker, WorkerPool};
