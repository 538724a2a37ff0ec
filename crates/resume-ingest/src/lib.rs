//! resume-ingest: background resume ingestion pipeline
//!
//! Turns an uploaded resume into structured candidate data. Each job runs
//! through validation, text extraction, AI structuring and storage while its
//! progress is tracked in a concurrent status store. Failures are classified
//! as retryable (returned to the dispatcher) or fatal (finalized as failed),
//! and derived candidate state (skills, total experience) is written back
//! with at-most-once guarantees.

pub mod config;
pub mod error;
pub mod normalization;
pub mod processing;
pub mod providers;
pub mod storage;
pub mod types;

pub use config::IngestConfig;
pub use error::{Error, ErrorKind, Result};
pub use processing::{
    classify, Classification, IngestWorker, JobQueue, PipelineCoordinator, StatusStore,
};
pub use types::{
    job::{JobIntake, ProcessingJob, ProcessingResult},
    resume::{ParsedResumeData, RawSkill, Skill, SkillCategory, WorkExperience},
    status::{PipelineStage, PipelineStatus, ProgressPhase},
};
