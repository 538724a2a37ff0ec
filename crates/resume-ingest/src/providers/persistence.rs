//! Candidate persistence trait

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{CandidateAggregate, ParsedResumeData, Skill, WorkExperience};

/// Trait for the store that owns candidates and their parsed resume data
#[async_trait]
pub trait CandidateStore: Send + Sync {
    /// Whether the candidate exists
    async fn candidate_exists(&self, candidate_id: &str) -> Result<bool>;

    /// Whether parsed resume data already exists for the candidate
    async fn has_parsed_resume_data(&self, candidate_id: &str) -> Result<bool>;

    /// Create parsed resume data. Fails with `Error::Conflict` when one exists.
    async fn create_parsed_resume_data(&self, data: &ParsedResumeData) -> Result<()>;

    /// Write derived values back to the candidate
    async fn update_candidate_aggregate(
        &self,
        candidate_id: &str,
        aggregate: CandidateAggregate,
    ) -> Result<()>;

    /// Store parsed resume data together with the candidate's derived values.
    ///
    /// The default runs the two writes one after the other. Stores that can
    /// should override it to commit both atomically, so a failed aggregate
    /// write never leaves parsed data behind that blocks every resubmission.
    async fn save_parsed_resume(
        &self,
        data: &ParsedResumeData,
        aggregate: CandidateAggregate,
    ) -> Result<()> {
        self.create_parsed_resume_data(data).await?;
        self.update_candidate_aggregate(&data.candidate_id, aggregate)
            .await
    }

    /// Replace the stored work history; returns false when no parsed data exists
    async fn replace_work_experience(
        &self,
        candidate_id: &str,
        experience: &[WorkExperience],
    ) -> Result<bool>;

    /// Replace the stored skill list; returns false when no parsed data exists
    async fn replace_skills(&self, candidate_id: &str, skills: &[Skill]) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}
