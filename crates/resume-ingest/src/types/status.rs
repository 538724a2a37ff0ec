//! Pipeline stages, progress phases, and the per-job status record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    Validation,
    Parsing,
    Storage,
    Completed,
    Failed,
}

impl PipelineStage {
    /// Completed and failed statuses are write-once
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::Completed | PipelineStage::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Validation => "validation",
            PipelineStage::Parsing => "parsing",
            PipelineStage::Storage => "storage",
            PipelineStage::Completed => "completed",
            PipelineStage::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "validation" => Some(PipelineStage::Validation),
            "parsing" => Some(PipelineStage::Parsing),
            "storage" => Some(PipelineStage::Storage),
            "completed" => Some(PipelineStage::Completed),
            "failed" => Some(PipelineStage::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fine-grained phase derived from a reported progress percentage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    Validation,
    ParsingStarting,
    TextExtraction,
    AiStructuring,
    StorageSaving,
    StorageFinalizing,
    Completed,
}

/// Progress mapping table: inclusive lower bound, phase label, coarse stage.
///
/// Percent 10 is the validation checkpoint: the job has passed validation and
/// is about to start parsing, so the label already reads `parsing:starting`
/// while the stage stays `validation` until parsing reports past it.
const PROGRESS_TABLE: [(u8, ProgressPhase, PipelineStage); 8] = [
    (0, ProgressPhase::Validation, PipelineStage::Validation),
    (10, ProgressPhase::ParsingStarting, PipelineStage::Validation),
    (11, ProgressPhase::ParsingStarting, PipelineStage::Parsing),
    (20, ProgressPhase::TextExtraction, PipelineStage::Parsing),
    (40, ProgressPhase::AiStructuring, PipelineStage::Parsing),
    (60, ProgressPhase::StorageSaving, PipelineStage::Storage),
    (80, ProgressPhase::StorageFinalizing, PipelineStage::Storage),
    (100, ProgressPhase::Completed, PipelineStage::Completed),
];

/// Map a reported percentage onto its stage and phase. Values above 100 count as 100.
pub fn map_progress(percent: u8) -> (PipelineStage, ProgressPhase) {
    let percent = percent.min(100);
    PROGRESS_TABLE
        .iter()
        .rev()
        .find(|(lower, _, _)| percent >= *lower)
        .map(|(_, phase, stage)| (*stage, *phase))
        .unwrap_or((PipelineStage::Validation, ProgressPhase::Validation))
}

impl ProgressPhase {
    /// Phase for a percentage
    pub fn from_percent(percent: u8) -> Self {
        map_progress(percent).1
    }

    /// First percentage belonging to this phase
    pub fn start_percent(&self) -> u8 {
        PROGRESS_TABLE
            .iter()
            .find(|(_, phase, _)| phase == self)
            .map(|(lower, _, _)| *lower)
            .unwrap_or(0)
    }

    /// Status message label, e.g. `parsing:text-extraction`
    pub fn label(&self) -> &'static str {
        match self {
            ProgressPhase::Validation => "validation",
            ProgressPhase::ParsingStarting => "parsing:starting",
            ProgressPhase::TextExtraction => "parsing:text-extraction",
            ProgressPhase::AiStructuring => "parsing:ai-structuring",
            ProgressPhase::StorageSaving => "storage:saving",
            ProgressPhase::StorageFinalizing => "storage:finalizing",
            ProgressPhase::Completed => "completed",
        }
    }
}

impl fmt::Display for ProgressPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Current status of one job's pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStatus {
    pub job_id: String,
    pub candidate_id: String,
    /// 0-100
    pub progress: u8,
    pub stage: PipelineStage,
    pub message: String,
    /// 1-based attempt number
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl PipelineStatus {
    /// Initial status written when a job starts
    pub fn started(job_id: impl Into<String>, candidate_id: impl Into<String>, attempt: u32) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.into(),
            candidate_id: candidate_id.into(),
            progress: 5,
            stage: PipelineStage::Validation,
            message: ProgressPhase::Validation.label().to_string(),
            attempt,
            started_at: now,
            updated_at: now,
            last_error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    /// Copy advanced to the given progress percentage
    pub fn advanced_to(&self, percent: u8) -> Self {
        let percent = percent.min(100);
        let (stage, phase) = map_progress(percent);
        Self {
            progress: percent,
            stage,
            message: phase.label().to_string(),
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    /// Copy for a new attempt of a running job.
    ///
    /// Progress and `started_at` carry over from the previous attempt, so the
    /// job's progress never moves backwards and its age counts from the first
    /// attempt.
    pub fn resumed(&self, attempt: u32) -> Self {
        let progress = self.progress.max(5);
        let (stage, phase) = map_progress(progress);
        Self {
            progress,
            stage,
            message: format!("{} (attempt {})", phase.label(), attempt),
            attempt,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    /// Terminal success copy
    pub fn completed(&self, message: impl Into<String>) -> Self {
        Self {
            progress: 100,
            stage: PipelineStage::Completed,
            message: message.into(),
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    /// Terminal failure copy; progress is kept where the job stopped
    pub fn failed(&self, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            stage: PipelineStage::Failed,
            message: format!("failed: {}", error),
            last_error: Some(error),
            updated_at: Utc::now(),
            ..self.clone()
        }
    }
}
