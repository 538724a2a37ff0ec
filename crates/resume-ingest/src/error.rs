//! Error types for the ingestion pipeline
//!
//! Every error carries an [`ErrorKind`] tag assigned where it is raised. The
//! retry classifier switches on the tag and never inspects message text.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error category used for retry classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Upstream signalled a rate limit
    RateLimited,
    /// Bad job shape, unsupported mime type, or rejected input
    Validation,
    /// Parsed resume data already exists for the candidate
    Conflict,
    /// Referenced candidate does not exist
    NotFound,
    /// A stage exceeded its time budget
    Timeout,
    /// Job was cancelled or finalized elsewhere
    Cancelled,
    /// Anything not recognized above
    Unknown,
}

/// Ingestion pipeline errors
#[derive(Debug, Error)]
pub enum Error {
    /// Job failed validation before any collaborator was contacted
    #[error("Validation error: {0}")]
    Validation(String),

    /// Parsed resume data already exists
    #[error("Parsed resume data already exists for candidate {0}")]
    Conflict(String),

    /// Upstream parsing service is rate limiting us
    #[error("Upstream rate limit exceeded: {0}")]
    RateLimited(String),

    /// Candidate not found
    #[error("Candidate not found: {0}")]
    CandidateNotFound(String),

    /// Stage timeout
    #[error("Stage '{stage}' timed out after {secs}s")]
    Timeout { stage: String, secs: u64 },

    /// Job cancelled at a stage boundary
    #[error("Job {job_id} cancelled: {reason}")]
    Cancelled { job_id: String, reason: String },

    /// Upstream parsing service failed in a non-transient way
    #[error("Upstream parser error: {0}")]
    Upstream(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML config parse error
    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a conflict error for a candidate
    pub fn conflict(candidate_id: impl Into<String>) -> Self {
        Self::Conflict(candidate_id.into())
    }

    /// Create a rate-limit error
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::RateLimited(message.into())
    }

    /// Create an upstream error
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream(message.into())
    }

    /// Create a database error
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database(message.into())
    }

    /// Create a timeout error for a stage
    pub fn timeout(stage: impl Into<String>, secs: u64) -> Self {
        Self::Timeout {
            stage: stage.into(),
            secs,
        }
    }

    /// Create a cancellation error
    pub fn cancelled(job_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Cancelled {
            job_id: job_id.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// The kind tag for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::RateLimited(_) => ErrorKind::RateLimited,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::CandidateNotFound(_) => ErrorKind::NotFound,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Cancelled { .. } => ErrorKind::Cancelled,
            Error::Upstream(_)
            | Error::Database(_)
            | Error::Config(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::Toml(_)
            | Error::Http(_)
            | Error::Internal(_) => ErrorKind::Unknown,
        }
    }
}
