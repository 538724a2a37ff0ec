//! Local candidate store over the SQLite database

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::storage::IngestDb;
use crate::types::{CandidateAggregate, ParsedResumeData, Skill, WorkExperience};

use super::persistence::CandidateStore;

/// Candidate store wrapping `IngestDb`
pub struct LocalCandidateStore {
    db: Arc<IngestDb>,
}

impl LocalCandidateStore {
    pub fn new(db: Arc<IngestDb>) -> Self {
        Self { db }
    }

    /// Get underlying database for direct access
    pub fn inner(&self) -> &Arc<IngestDb> {
        &self.db
    }
}

async fn blocking<T, F>(db: &Arc<IngestDb>, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&IngestDb) -> Result<T> + Send + 'static,
{
    // rusqlite is sync, run it off the async workers
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
}

#[async_trait]
impl CandidateStore for LocalCandidateStore {
    async fn candidate_exists(&self, candidate_id: &str) -> Result<bool> {
        let candidate_id = candidate_id.to_string();
        blocking(&self.db, move |db| db.candidate_exists(&candidate_id)).await
    }

    async fn has_parsed_resume_data(&self, candidate_id: &str) -> Result<bool> {
        let candidate_id = candidate_id.to_string();
        blocking(&self.db, move |db| db.has_parsed_resume_data(&candidate_id)).await
    }

    async fn create_parsed_resume_data(&self, data: &ParsedResumeData) -> Result<()> {
        let data = data.clone();
        blocking(&self.db, move |db| db.insert_parsed_resume_data(&data)).await
    }

    async fn update_candidate_aggregate(
        &self,
        candidate_id: &str,
        aggregate: CandidateAggregate,
    ) -> Result<()> {
        let candidate_id = candidate_id.to_string();
        blocking(&self.db, move |db| {
            db.set_total_experience(&candidate_id, aggregate.total_experience)
        })
        .await
    }

    async fn save_parsed_resume(
        &self,
        data: &ParsedResumeData,
        aggregate: CandidateAggregate,
    ) -> Result<()> {
        let data = data.clone();
        blocking(&self.db, move |db| {
            db.insert_parsed_resume_with_total(&data, aggregate.total_experience)
        })
        .await
    }

    async fn replace_work_experience(
        &self,
        candidate_id: &str,
        experience: &[WorkExperience],
    ) -> Result<bool> {
        let candidate_id = candidate_id.to_string();
        let experience = experience.to_vec();
        blocking(&self.db, move |db| {
            db.replace_work_experience(&candidate_id, &experience)
        })
        .await
    }

    async fn replace_skills(&self, candidate_id: &str, skills: &[Skill]) -> Result<bool> {
        let candidate_id = candidate_id.to_string();
        let skills = skills.to_vec();
        blocking(&self.db, move |db| db.replace_skills(&candidate_id, &skills)).await
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}
