//! SQLite database for candidates, parsed resume data and pipeline status
//!
//! One row of parsed resume data per candidate is enforced by the primary key,
//! so concurrent creations race safely: the loser gets `Error::Conflict`.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::{
    Certification, Education, ParsedResumeData, PipelineStage, PipelineStatus, Skill,
    WorkExperience,
};

/// SQLite-backed store
pub struct IngestDb {
    conn: Arc<Mutex<Connection>>,
}

impl IngestDb {
    /// Create or open the database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| Error::database(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate(true)?;
        Ok(db)
    }

    /// Create an in-memory database
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::database(format!("Failed to open in-memory database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate(false)?;
        Ok(db)
    }

    fn migrate(&self, file_backed: bool) -> Result<()> {
        let conn = self.conn.lock();

        if file_backed {
            conn.execute_batch(
                r#"
                PRAGMA journal_mode=WAL;
                PRAGMA synchronous=NORMAL;
                "#,
            )
            .map_err(|e| Error::database(format!("Failed to set pragmas: {}", e)))?;
        }

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys=ON;

            CREATE TABLE IF NOT EXISTS candidates (
                id TEXT PRIMARY KEY,
                total_experience REAL NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS parsed_resume_data (
                candidate_id TEXT PRIMARY KEY REFERENCES candidates(id) ON DELETE CASCADE,
                skills_json TEXT NOT NULL,
                work_experience_json TEXT NOT NULL,
                education_json TEXT NOT NULL,
                certifications_json TEXT NOT NULL,
                summary TEXT,
                raw_text TEXT NOT NULL,
                parsing_confidence REAL NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS pipeline_status (
                job_id TEXT PRIMARY KEY,
                candidate_id TEXT NOT NULL,
                progress INTEGER NOT NULL,
                stage TEXT NOT NULL,
                message TEXT NOT NULL,
                attempt INTEGER NOT NULL,
                started_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                last_error TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_pipeline_status_stage ON pipeline_status(stage);
            CREATE INDEX IF NOT EXISTS idx_pipeline_status_candidate ON pipeline_status(candidate_id);
            "#,
        )
        .map_err(|e| Error::database(format!("Failed to run migrations: {}", e)))?;

        tracing::debug!("Database migrations complete");
        Ok(())
    }

    // ==================== Candidate Operations ====================

    /// Register a candidate; returns false when it already exists
    pub fn register_candidate(&self, candidate_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();

        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO candidates (id, total_experience, created_at, updated_at) VALUES (?1, 0, ?2, ?2)",
                params![candidate_id, now],
            )
            .map_err(|e| Error::database(format!("Failed to register candidate: {}", e)))?;

        Ok(inserted > 0)
    }

    pub fn candidate_exists(&self, candidate_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM candidates WHERE id = ?1",
                params![candidate_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::database(format!("Failed to look up candidate: {}", e)))?;

        Ok(found.is_some())
    }

    /// Remove a candidate and its parsed data
    pub fn delete_candidate(&self, candidate_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let deleted = conn
            .execute("DELETE FROM candidates WHERE id = ?1", params![candidate_id])
            .map_err(|e| Error::database(format!("Failed to delete candidate: {}", e)))?;
        Ok(deleted > 0)
    }

    pub fn total_experience(&self, candidate_id: &str) -> Result<Option<f64>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT total_experience FROM candidates WHERE id = ?1",
            params![candidate_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| Error::database(format!("Failed to read total experience: {}", e)))
    }

    pub fn set_total_experience(&self, candidate_id: &str, years: f64) -> Result<()> {
        let conn = self.conn.lock();
        let updated = conn
            .execute(
                "UPDATE candidates SET total_experience = ?2, updated_at = ?3 WHERE id = ?1",
                params![candidate_id, years, Utc::now().to_rfc3339()],
            )
            .map_err(|e| Error::database(format!("Failed to update total experience: {}", e)))?;

        if updated == 0 {
            return Err(Error::CandidateNotFound(candidate_id.to_string()));
        }
        Ok(())
    }

    // ==================== Parsed Resume Data Operations ====================

    /// Insert parsed resume data; a second insert for the same candidate is a conflict
    pub fn insert_parsed_resume_data(&self, data: &ParsedResumeData) -> Result<()> {
        let conn = self.conn.lock();
        insert_parsed_row(&conn, data)
    }

    /// Insert parsed resume data and write the candidate's total experience in
    /// one transaction. Either both are stored or neither is.
    pub fn insert_parsed_resume_with_total(
        &self,
        data: &ParsedResumeData,
        total_experience: f64,
    ) -> Result<()> {
        let mut conn = self.conn.lock();

        let tx = conn
            .transaction()
            .map_err(|e| Error::database(format!("Failed to begin transaction: {}", e)))?;

        insert_parsed_row(&tx, data)?;

        let updated = tx
            .execute(
                "UPDATE candidates SET total_experience = ?2, updated_at = ?3 WHERE id = ?1",
                params![data.candidate_id, total_experience, Utc::now().to_rfc3339()],
            )
            .map_err(|e| Error::database(format!("Failed to update total experience: {}", e)))?;
        if updated == 0 {
            return Err(Error::CandidateNotFound(data.candidate_id.clone()));
        }

        tx.commit()
            .map_err(|e| Error::database(format!("Failed to commit transaction: {}", e)))?;

        Ok(())
    }

    pub fn has_parsed_resume_data(&self, candidate_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM parsed_resume_data WHERE candidate_id = ?1",
                params![candidate_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::database(format!("Failed to look up parsed data: {}", e)))?;

        Ok(found.is_some())
    }

    pub fn get_parsed_resume_data(&self, candidate_id: &str) -> Result<Option<ParsedResumeData>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare(
                r#"
                SELECT candidate_id, skills_json, work_experience_json, education_json,
                       certifications_json, summary, raw_text, parsing_confidence, created_at
                FROM parsed_resume_data WHERE candidate_id = ?1
                "#,
            )
            .map_err(|e| Error::database(format!("Failed to prepare query: {}", e)))?;

        let record = stmt
            .query_row(params![candidate_id], row_to_parsed_resume_data)
            .optional()
            .map_err(|e| Error::database(format!("Failed to get parsed resume data: {}", e)))?;

        Ok(record)
    }

    /// Number of parsed resume rows across all candidates
    pub fn count_parsed_resume_data(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM parsed_resume_data", [], |row| row.get(0))
            .map_err(|e| Error::database(format!("Failed to count parsed data: {}", e)))?;
        Ok(count as usize)
    }

    /// Replace the stored work history; returns false when the candidate has no parsed data
    pub fn replace_work_experience(
        &self,
        candidate_id: &str,
        experience: &[WorkExperience],
    ) -> Result<bool> {
        let conn = self.conn.lock();
        let updated = conn
            .execute(
                "UPDATE parsed_resume_data SET work_experience_json = ?2 WHERE candidate_id = ?1",
                params![candidate_id, serde_json::to_string(experience)?],
            )
            .map_err(|e| Error::database(format!("Failed to replace work experience: {}", e)))?;
        Ok(updated > 0)
    }

    /// Replace the stored skill list; returns false when the candidate has no parsed data
    pub fn replace_skills(&self, candidate_id: &str, skills: &[Skill]) -> Result<bool> {
        let conn = self.conn.lock();
        let updated = conn
            .execute(
                "UPDATE parsed_resume_data SET skills_json = ?2 WHERE candidate_id = ?1",
                params![candidate_id, serde_json::to_string(skills)?],
            )
            .map_err(|e| Error::database(format!("Failed to replace skills: {}", e)))?;
        Ok(updated > 0)
    }

    // ==================== Pipeline Status Operations ====================

    /// Insert or update a pipeline status. Terminal rows are never overwritten.
    pub fn upsert_pipeline_status(&self, status: &PipelineStatus) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            r#"
            INSERT INTO pipeline_status (
                job_id, candidate_id, progress, stage, message, attempt,
                started_at, updated_at, last_error
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(job_id) DO UPDATE SET
                candidate_id = excluded.candidate_id,
                progress = excluded.progress,
                stage = excluded.stage,
                message = excluded.message,
                attempt = excluded.attempt,
                started_at = excluded.started_at,
                updated_at = excluded.updated_at,
                last_error = excluded.last_error
            WHERE pipeline_status.stage NOT IN ('completed', 'failed')
            "#,
            params![
                status.job_id,
                status.candidate_id,
                status.progress as i64,
                status.stage.as_str(),
                status.message,
                status.attempt as i64,
                status.started_at.to_rfc3339(),
                status.updated_at.to_rfc3339(),
                status.last_error,
            ],
        )
        .map_err(|e| Error::database(format!("Failed to upsert pipeline status: {}", e)))?;

        Ok(())
    }

    pub fn get_pipeline_status(&self, job_id: &str) -> Result<Option<PipelineStatus>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare(
                r#"
                SELECT job_id, candidate_id, progress, stage, message, attempt,
                       started_at, updated_at, last_error
                FROM pipeline_status WHERE job_id = ?1
                "#,
            )
            .map_err(|e| Error::database(format!("Failed to prepare query: {}", e)))?;

        stmt.query_row(params![job_id], row_to_pipeline_status)
            .optional()
            .map_err(|e| Error::database(format!("Failed to get pipeline status: {}", e)))
    }

    /// All persisted statuses, oldest first
    pub fn list_pipeline_statuses(&self) -> Result<Vec<PipelineStatus>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare(
                r#"
                SELECT job_id, candidate_id, progress, stage, message, attempt,
                       started_at, updated_at, last_error
                FROM pipeline_status ORDER BY started_at ASC
                "#,
            )
            .map_err(|e| Error::database(format!("Failed to prepare query: {}", e)))?;

        let records = stmt
            .query_map([], row_to_pipeline_status)
            .map_err(|e| Error::database(format!("Failed to list pipeline statuses: {}", e)))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(records)
    }
}

fn insert_parsed_row(conn: &Connection, data: &ParsedResumeData) -> Result<()> {
    let result = conn.execute(
        r#"
        INSERT INTO parsed_resume_data (
            candidate_id, skills_json, work_experience_json, education_json,
            certifications_json, summary, raw_text, parsing_confidence, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
        params![
            data.candidate_id,
            serde_json::to_string(&data.skills)?,
            serde_json::to_string(&data.work_experience)?,
            serde_json::to_string(&data.education)?,
            serde_json::to_string(&data.certifications)?,
            data.summary,
            data.raw_text,
            data.parsing_confidence as f64,
            data.created_at.to_rfc3339(),
        ],
    );

    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
        {
            Err(Error::conflict(&data.candidate_id))
        }
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
        {
            Err(Error::CandidateNotFound(data.candidate_id.clone()))
        }
        Err(e) => Err(Error::database(format!(
            "Failed to insert parsed resume data: {}",
            e
        ))),
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_parsed_resume_data(row: &rusqlite::Row) -> rusqlite::Result<ParsedResumeData> {
    let candidate_id: String = row.get(0)?;
    let skills_json: String = row.get(1)?;
    let work_experience_json: String = row.get(2)?;
    let education_json: String = row.get(3)?;
    let certifications_json: String = row.get(4)?;
    let summary: Option<String> = row.get(5)?;
    let raw_text: String = row.get(6)?;
    let parsing_confidence: f64 = row.get(7)?;
    let created_at: String = row.get(8)?;

    let skills: Vec<Skill> = serde_json::from_str(&skills_json).unwrap_or_default();
    let work_experience: Vec<WorkExperience> =
        serde_json::from_str(&work_experience_json).unwrap_or_default();
    let education: Vec<Education> = serde_json::from_str(&education_json).unwrap_or_default();
    let certifications: Vec<Certification> =
        serde_json::from_str(&certifications_json).unwrap_or_default();

    Ok(ParsedResumeData {
        candidate_id,
        skills,
        work_experience,
        education,
        certifications,
        summary,
        raw_text,
        parsing_confidence: parsing_confidence as f32,
        created_at: parse_timestamp(&created_at),
    })
}

fn row_to_pipeline_status(row: &rusqlite::Row) -> rusqlite::Result<PipelineStatus> {
    let job_id: String = row.get(0)?;
    let candidate_id: String = row.get(1)?;
    let progress: i64 = row.get(2)?;
    let stage: String = row.get(3)?;
    let message: String = row.get(4)?;
    let attempt: i64 = row.get(5)?;
    let started_at: String = row.get(6)?;
    let updated_at: String = row.get(7)?;
    let last_error: Option<String> = row.get(8)?;

    Ok(PipelineStatus {
        job_id,
        candidate_id,
        progress: progress.clamp(0, 100) as u8,
        stage: PipelineStage::parse(&stage).unwrap_or(PipelineStage::Failed),
        message,
        attempt: attempt.max(0) as u32,
        started_at: parse_timestamp(&started_at),
        updated_at: parse_timestamp(&updated_at),
        last_error,
    })
}
