//! Pipeline coordinator
//!
//! Runs one job through validation, parsing and storage, reports progress
//! through the status store, and finalizes every job exactly once. An error
//! raised inside a stage is handled at one place: it is either returned as
//! `Err` so the dispatcher retries the whole job (status stays non-terminal),
//! or turned into a terminal failed status plus an `Ok` failure result.

use chrono::{DateTime, NaiveDate, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use crate::config::IngestConfig;
use crate::error::{Error, Result};
use crate::normalization::{normalize_skills, total_experience_years, with_proficiency};
use crate::providers::{CandidateStore, DocumentParser};
use crate::types::{
    CandidateAggregate, ParsedResumeData, PipelineStage, PipelineStatus, ProcessingJob,
    ProcessingResult, ProgressPhase, Skill, StructuredResume, WorkExperience,
};

use super::cancellation::CancellationRegistry;
use super::classifier::classify;
use super::status_store::StatusStore;

/// Source of the current time
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Result of `PipelineCoordinator::start`
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    /// Job passed validation; carries the resolved mime type
    Started { job_id: String, mime_type: String },
    /// Job was finalized without running
    Rejected(ProcessingResult),
}

/// Orchestrates the per-job pipeline
pub struct PipelineCoordinator {
    config: Arc<IngestConfig>,
    statuses: Arc<StatusStore>,
    parser: Arc<dyn DocumentParser>,
    persistence: Arc<dyn CandidateStore>,
    cancellations: Arc<CancellationRegistry>,
    clock: Clock,
}

impl PipelineCoordinator {
    /// Create a new coordinator
    pub fn new(
        config: Arc<IngestConfig>,
        statuses: Arc<StatusStore>,
        parser: Arc<dyn DocumentParser>,
        persistence: Arc<dyn CandidateStore>,
    ) -> Self {
        tracing::info!(
            "Coordinator configured: parser={}, store={}, {}s stage timeout, {} max attempts",
            parser.name(),
            persistence.name(),
            config.processing.stage_timeout_secs,
            config.processing.max_attempts
        );

        Self {
            config,
            statuses,
            parser,
            persistence,
            cancellations: Arc::new(CancellationRegistry::new()),
            clock: Arc::new(Utc::now),
        }
    }

    /// Share a cancellation registry
    pub fn with_cancellations(mut self, cancellations: Arc<CancellationRegistry>) -> Self {
        self.cancellations = cancellations;
        self
    }

    /// Replace the clock (tests pin "now")
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn statuses(&self) -> &Arc<StatusStore> {
        &self.statuses
    }

    pub fn cancellations(&self) -> &Arc<CancellationRegistry> {
        &self.cancellations
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    // ==================== Lifecycle ====================

    /// Validate the job and write its initial status.
    ///
    /// A job failing validation is finalized as failed right away and no
    /// collaborator is contacted.
    pub fn start(&self, job: &ProcessingJob, attempt: u32) -> StartOutcome {
        let candidate_id = job.candidate_id();

        let mime_type = match self.validate(job) {
            Ok(mime_type) => mime_type,
            Err(e) => {
                tracing::error!("Job {} failed validation: {}", job.job_id, e);
                let result = self.finalize_failed(job, &e.to_string(), attempt, 0);
                return StartOutcome::Rejected(result);
            }
        };

        // A retry resumes the stored status instead of replacing it
        let written = self.statuses.update(&job.job_id, |current| {
            Some(match current {
                Some(previous) => previous.resumed(attempt),
                None => PipelineStatus::started(&job.job_id, candidate_id, attempt),
            })
        });
        if written.is_none() {
            tracing::warn!("Job {} already finalized, not starting attempt {}", job.job_id, attempt);
            return StartOutcome::Rejected(self.stored_outcome(&job.job_id, candidate_id, 0));
        }

        tracing::info!(
            "Started job {} for candidate {} (attempt {}, {})",
            job.job_id,
            candidate_id,
            attempt,
            mime_type
        );

        StartOutcome::Started {
            job_id: job.job_id.clone(),
            mime_type,
        }
    }

    /// Check the job shape; returns the resolved mime type
    pub fn validate(&self, job: &ProcessingJob) -> Result<String> {
        if job.candidate_id.is_none() {
            return Err(Error::validation("candidateId is required"));
        }
        if job.file_location.trim().is_empty() {
            return Err(Error::validation("fileUrl or filePath is required"));
        }

        let mut mime_type = job.mime_type.clone();
        if mime_type.is_empty() && self.config.validation.infer_mime_from_name {
            mime_type = mime_guess::from_path(&job.original_file_name)
                .first_raw()
                .unwrap_or_default()
                .to_string();
        }

        if mime_type.is_empty() {
            return Err(Error::validation("mimeType is required"));
        }
        if !self.config.validation.is_allowed(&mime_type) {
            return Err(Error::validation(format!("Unsupported mime type: {}", mime_type)));
        }

        Ok(mime_type)
    }

    /// Record progress. No-op (returns false) when the job is unknown,
    /// already terminal, or the value would move progress backwards.
    pub fn report_progress(&self, job_id: &str, percent: u8) -> bool {
        let percent = percent.min(100);
        let written = self.statuses.update(job_id, |current| {
            let current = current?;
            if percent < current.progress {
                return None;
            }
            Some(current.advanced_to(percent))
        });

        match written {
            Some(status) => {
                tracing::debug!("Job {} progress {}% ({})", job_id, percent, status.message);
                true
            }
            None => false,
        }
    }

    /// Finalize a job as completed. Only the first call has any effect; later
    /// calls report whatever terminal state is stored.
    pub fn complete(&self, job_id: &str, candidate_id: &str, duration_ms: u64) -> ProcessingResult {
        let written = self.statuses.update(job_id, |current| {
            let base = current
                .cloned()
                .unwrap_or_else(|| PipelineStatus::started(job_id, candidate_id, 1));
            Some(base.completed(ProgressPhase::Completed.label()))
        });

        self.cancellations.clear_job(job_id);

        if written.is_none() {
            return self.stored_outcome(job_id, candidate_id, duration_ms);
        }

        tracing::info!(
            "Job {} completed for candidate {} in {}ms",
            job_id,
            candidate_id,
            duration_ms
        );
        ProcessingResult::success(candidate_id, duration_ms)
    }

    /// Handle a stage failure.
    ///
    /// Retryable errors with attempts left come back as `Err` and the status
    /// stays non-terminal. Anything else is finalized as failed and returned
    /// as an `Ok` failure result.
    pub fn fail(
        &self,
        job: &ProcessingJob,
        err: Error,
        attempt: u32,
        duration_ms: u64,
    ) -> Result<ProcessingResult> {
        let max_attempts = self.config.processing.max_attempts;

        if classify(&err).is_retryable() && attempt < max_attempts {
            tracing::warn!(
                "Job {} attempt {}/{} failed, will retry: {}",
                job.job_id,
                attempt,
                max_attempts,
                err
            );
            let message = err.to_string();
            self.statuses.update(&job.job_id, |current| {
                current.map(|s| PipelineStatus {
                    last_error: Some(message.clone()),
                    updated_at: Utc::now(),
                    ..s.clone()
                })
            });
            return Err(err);
        }

        tracing::error!(
            "Job {} failed on attempt {} ({:?}): {}",
            job.job_id,
            attempt,
            err.kind(),
            err
        );
        Ok(self.finalize_failed(job, &err.to_string(), attempt, duration_ms))
    }

    fn finalize_failed(
        &self,
        job: &ProcessingJob,
        message: &str,
        attempt: u32,
        duration_ms: u64,
    ) -> ProcessingResult {
        let candidate_id = job.candidate_id();
        let written = self.statuses.update(&job.job_id, |current| {
            let base = current.cloned().unwrap_or_else(|| PipelineStatus {
                progress: 0,
                ..PipelineStatus::started(&job.job_id, candidate_id, attempt)
            });
            Some(base.failed(message))
        });

        self.cancellations.clear_job(&job.job_id);

        if written.is_none() {
            return self.stored_outcome(&job.job_id, candidate_id, duration_ms);
        }
        ProcessingResult::failure(candidate_id, message, duration_ms)
    }

    /// Result matching the stored terminal status
    fn stored_outcome(&self, job_id: &str, candidate_id: &str, duration_ms: u64) -> ProcessingResult {
        match self.statuses.get(job_id) {
            Some(status) if status.stage == PipelineStage::Completed => {
                ProcessingResult::success(candidate_id, duration_ms)
            }
            Some(status) => ProcessingResult::failure(
                candidate_id,
                status
                    .last_error
                    .unwrap_or_else(|| format!("job already {}", status.stage)),
                duration_ms,
            ),
            None => ProcessingResult::failure(candidate_id, "job status missing", duration_ms),
        }
    }

    // ==================== Pipeline ====================

    /// Run one attempt of a job end to end.
    ///
    /// `Err` means "retry the whole job"; every other outcome, failures
    /// included, comes back as `Ok`.
    pub async fn process(&self, job: &ProcessingJob, attempt: u32) -> Result<ProcessingResult> {
        let started = Instant::now();

        let mime_type = match self.start(job, attempt) {
            StartOutcome::Started { mime_type, .. } => mime_type,
            StartOutcome::Rejected(result) => return Ok(result),
        };

        let outcome = self.run_stages(job, &mime_type).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(()) => Ok(self.complete(&job.job_id, job.candidate_id(), duration_ms)),
            Err(e) => self.fail(job, e, attempt, duration_ms),
        }
    }

    async fn run_stages(&self, job: &ProcessingJob, mime_type: &str) -> Result<()> {
        let job_id = job.job_id.as_str();
        let candidate_id = job.candidate_id();

        self.report_progress(job_id, ProgressPhase::ParsingStarting.start_percent());
        self.checkpoint(job)?;

        if !self
            .bounded("validation:candidate", self.persistence.candidate_exists(candidate_id))
            .await?
        {
            return Err(Error::CandidateNotFound(candidate_id.to_string()));
        }
        if self
            .bounded(
                "validation:candidate",
                self.persistence.has_parsed_resume_data(candidate_id),
            )
            .await?
        {
            return Err(Error::conflict(candidate_id));
        }

        self.enter(job, ProgressPhase::TextExtraction)?;
        let raw_text = self
            .bounded(
                ProgressPhase::TextExtraction.label(),
                self.parser.extract_text(&job.file_location, mime_type),
            )
            .await?;

        self.enter(job, ProgressPhase::AiStructuring)?;
        let structured = self
            .bounded(
                ProgressPhase::AiStructuring.label(),
                self.parser.structure(&raw_text, mime_type),
            )
            .await?;

        self.checkpoint(job)?;
        let data = self.shape(candidate_id, structured, raw_text);
        let aggregate = CandidateAggregate {
            total_experience: total_experience_years(&data.work_experience, self.today()),
        };

        tracing::debug!(
            "Job {}: {} skills, {} positions, {} years",
            job_id,
            data.skills.len(),
            data.work_experience.len(),
            aggregate.total_experience
        );

        self.enter(job, ProgressPhase::StorageSaving)?;
        self.bounded(
            ProgressPhase::StorageSaving.label(),
            self.persistence.save_parsed_resume(&data, aggregate),
        )
        .await?;

        // Data is committed, only completion is left
        self.report_progress(job_id, ProgressPhase::StorageFinalizing.start_percent());

        Ok(())
    }

    /// Stage boundary: check cancellation, then report the phase's progress
    fn enter(&self, job: &ProcessingJob, phase: ProgressPhase) -> Result<()> {
        self.checkpoint(job)?;
        self.report_progress(&job.job_id, phase.start_percent());
        Ok(())
    }

    /// Stop if the job was cancelled or finalized elsewhere (e.g. by the watchdog)
    fn checkpoint(&self, job: &ProcessingJob) -> Result<()> {
        let status = self.statuses.get(&job.job_id);
        let started_at = status.as_ref().map(|s| s.started_at).unwrap_or_else(Utc::now);

        if let Some(reason) = self
            .cancellations
            .reason(&job.job_id, job.candidate_id(), started_at)
        {
            return Err(Error::cancelled(&job.job_id, reason));
        }
        if let Some(status) = status {
            if status.is_terminal() {
                return Err(Error::cancelled(
                    &job.job_id,
                    format!("status already {}", status.stage),
                ));
            }
        }
        Ok(())
    }

    /// Run a collaborator call under the stage timeout
    async fn bounded<T, F>(&self, stage: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let limit = self.config.processing.stage_timeout();
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!("Stage '{}' exceeded {}s", stage, limit.as_secs());
                Err(Error::timeout(stage, limit.as_secs()))
            }
        }
    }

    fn shape(
        &self,
        candidate_id: &str,
        structured: StructuredResume,
        raw_text: String,
    ) -> ParsedResumeData {
        let raw_text = if structured.raw_text.is_empty() {
            raw_text
        } else {
            structured.raw_text
        };

        ParsedResumeData {
            candidate_id: candidate_id.to_string(),
            skills: normalize_skills(&structured.skills),
            work_experience: structured.work_experience,
            education: structured.education,
            certifications: structured.certifications,
            summary: structured.summary,
            raw_text,
            parsing_confidence: structured.confidence.clamp(0.0, 1.0),
            created_at: self.now(),
        }
    }

    // ==================== Watchdog ====================

    /// Force-fail every non-terminal job that started longer ago than the
    /// maximum job duration. Returns the ids of the jobs it finalized.
    pub fn fail_stalled(&self, now: DateTime<Utc>) -> Vec<String> {
        let limit = self.config.processing.max_job_duration_secs;
        let cutoff = now - chrono::Duration::seconds(limit as i64);
        let message = format!("stalled: exceeded max job duration of {}s", limit);

        let mut failed = Vec::new();
        for stalled in self.statuses.stalled_since(cutoff) {
            let written = self.statuses.update(&stalled.job_id, |current| {
                current.map(|s| s.failed(message.as_str()))
            });
            if written.is_some() {
                tracing::warn!(
                    "Force-failed stalled job {} (candidate {}, {}% at {})",
                    stalled.job_id,
                    stalled.candidate_id,
                    stalled.progress,
                    stalled.stage
                );
                failed.push(stalled.job_id);
            }
        }

        let pruned = self.cancellations.prune(cutoff);
        if pruned > 0 {
            tracing::debug!("Dropped {} expired cancellation requests", pruned);
        }

        failed
    }

    // ==================== Derived state ====================

    /// Replace a candidate's work history and recompute total experience
    pub async fn sync_work_experience(
        &self,
        candidate_id: &str,
        experience: &[WorkExperience],
    ) -> Result<CandidateAggregate> {
        sync_work_experience(self.persistence.as_ref(), candidate_id, experience, self.today())
            .await
    }

    /// Store a new skill list with one proficiency changed
    pub async fn update_skill_proficiency(
        &self,
        candidate_id: &str,
        skills: &[Skill],
        name: &str,
        proficiency: f32,
    ) -> Result<Option<Vec<Skill>>> {
        let updated = match with_proficiency(skills, name, proficiency) {
            Some(updated) => updated,
            None => return Ok(None),
        };

        if !self.persistence.replace_skills(candidate_id, &updated).await? {
            return Err(Error::CandidateNotFound(candidate_id.to_string()));
        }
        Ok(Some(updated))
    }
}

/// Replace a candidate's work history and write the recomputed total back
pub async fn sync_work_experience(
    store: &dyn CandidateStore,
    candidate_id: &str,
    experience: &[WorkExperience],
    now: NaiveDate,
) -> Result<CandidateAggregate> {
    if !store.replace_work_experience(candidate_id, experience).await? {
        return Err(Error::CandidateNotFound(candidate_id.to_string()));
    }

    let aggregate = CandidateAggregate {
        total_experience: total_experience_years(experience, now),
    };
    store.update_candidate_aggregate(candidate_id, aggregate).await?;

    tracing::info!(
        "Synced {} positions for candidate {}: {} years",
        experience.len(),
        candidate_id,
        aggregate.total_experience
    );
    Ok(aggregate)
}
