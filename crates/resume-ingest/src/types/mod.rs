//! Core types for the ingestion pipeline

pub mod job;
pub mod resume;
pub mod status;

pub use job::{JobIntake, ProcessingJob, ProcessingResult};
pub use resume::{
    CandidateAggregate, Certification, Education, ParsedResumeData, RawSkill, Skill,
    SkillCategory, StructuredResume, WorkExperience,
};
pub use status::{map_progress, PipelineStage, PipelineStatus, ProgressPhase};
