//! Retry classification for pipeline errors

use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind};

/// Whether a failed job should be retried by the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Retryable,
    Fatal,
}

impl Classification {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Classification::Retryable)
    }
}

/// Classify an error by its kind tag.
///
/// Only upstream rate limiting is transient. Everything else, unrecognized
/// kinds included, is fatal.
pub fn classify(err: &Error) -> Classification {
    classify_kind(err.kind())
}

pub fn classify_kind(kind: ErrorKind) -> Classification {
    match kind {
        ErrorKind::RateLimited => Classification::Retryable,
        ErrorKind::Validation
        | ErrorKind::Conflict
        | ErrorKind::NotFound
        | ErrorKind::Timeout
        | ErrorKind::Cancelled
        | ErrorKind::Unknown => Classification::Fatal,
    }
}
