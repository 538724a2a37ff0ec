//! Job intake, the immutable processing job, and the dispatcher-facing result

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job payload as delivered by the dispatcher
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobIntake {
    /// Dispatcher job id (generated when absent)
    #[serde(default)]
    pub job_id: Option<String>,
    /// Candidate this resume belongs to
    #[serde(default)]
    pub candidate_id: Option<String>,
    /// Remote location of the uploaded file
    #[serde(default)]
    pub file_url: Option<String>,
    /// Local path of the uploaded file
    #[serde(default)]
    pub file_path: Option<String>,
    /// File name as uploaded
    #[serde(default)]
    pub original_name: String,
    /// Declared mime type
    #[serde(default)]
    pub mime_type: String,
}

/// A resume processing job. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingJob {
    pub job_id: String,
    pub candidate_id: Option<String>,
    pub file_location: String,
    pub original_file_name: String,
    pub mime_type: String,
    pub enqueued_at: DateTime<Utc>,
}

impl ProcessingJob {
    /// Build a job from a dispatcher intake.
    ///
    /// The file URL wins over the local path when both are present. Blank
    /// candidate ids are kept as `None` so validation can reject them.
    pub fn from_intake(intake: JobIntake) -> Self {
        let job_id = intake
            .job_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let file_location = intake
            .file_url
            .filter(|u| !u.trim().is_empty())
            .or(intake.file_path)
            .unwrap_or_default();

        Self {
            job_id,
            candidate_id: intake
                .candidate_id
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
            file_location,
            original_file_name: intake.original_name,
            mime_type: intake.mime_type.trim().to_lowercase(),
            enqueued_at: Utc::now(),
        }
    }

    /// Candidate id, or an empty string when missing
    pub fn candidate_id(&self) -> &str {
        self.candidate_id.as_deref().unwrap_or("")
    }
}

/// Terminal outcome handed back to the dispatcher.
///
/// Same shape for success and failure. Returning this (rather than an error)
/// tells the dispatcher the job is finished and must not be retried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResult {
    pub candidate_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall time in milliseconds
    pub processing_time: u64,
}

impl ProcessingResult {
    pub fn success(candidate_id: impl Into<String>, processing_time: u64) -> Self {
        Self {
            candidate_id: candidate_id.into(),
            success: true,
            error: None,
            processing_time,
        }
    }

    pub fn failure(
        candidate_id: impl Into<String>,
        error: impl Into<String>,
        processing_time: u64,
    ) -> Self {
        Self {
            candidate_id: candidate_id.into(),
            success: false,
            error: Some(error.into()),
            processing_time,
        }
    }
}
