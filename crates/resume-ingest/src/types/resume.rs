//! Parsed resume data and its building blocks

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::normalization::experience::deserialize_flexible_date;

/// Skill category buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SkillCategory {
    #[serde(rename = "Programming Languages")]
    ProgrammingLanguages,
    #[serde(rename = "Frameworks & Libraries")]
    FrameworksLibraries,
    #[serde(rename = "Databases")]
    Databases,
    #[serde(rename = "Cloud & DevOps")]
    CloudDevOps,
    #[serde(rename = "Tools & Technologies")]
    ToolsTechnologies,
    #[serde(rename = "Other")]
    Other,
}

impl SkillCategory {
    /// Display name
    pub fn as_str(&self) -> &'static str {
        match self {
            SkillCategory::ProgrammingLanguages => "Programming Languages",
            SkillCategory::FrameworksLibraries => "Frameworks & Libraries",
            SkillCategory::Databases => "Databases",
            SkillCategory::CloudDevOps => "Cloud & DevOps",
            SkillCategory::ToolsTechnologies => "Tools & Technologies",
            SkillCategory::Other => "Other",
        }
    }

    /// Parse a category label supplied by the parser.
    ///
    /// Blank labels are treated as absent; unrecognized labels land in `Other`.
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim();
        if label.is_empty() {
            return None;
        }

        let lowered = label.to_lowercase();
        let category = match lowered.as_str() {
            "programming languages" | "programming language" | "languages" => {
                SkillCategory::ProgrammingLanguages
            }
            "frameworks & libraries" | "frameworks and libraries" | "frameworks" | "libraries" => {
                SkillCategory::FrameworksLibraries
            }
            "databases" | "database" => SkillCategory::Databases,
            "cloud & devops" | "cloud and devops" | "cloud" | "devops" => SkillCategory::CloudDevOps,
            "tools & technologies" | "tools and technologies" | "tools" => {
                SkillCategory::ToolsTechnologies
            }
            _ => SkillCategory::Other,
        };
        Some(category)
    }
}

impl fmt::Display for SkillCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn deserialize_category<'de, D>(deserializer: D) -> Result<Option<SkillCategory>, D::Error>
where
    D: Deserializer<'de>,
{
    let label: Option<String> = Option::deserialize(deserializer)?;
    Ok(label.as_deref().and_then(SkillCategory::parse))
}

/// A skill as emitted by the structured parser, before normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSkill {
    pub name: String,
    #[serde(default)]
    pub proficiency: Option<f32>,
    #[serde(default, deserialize_with = "deserialize_category")]
    pub category: Option<SkillCategory>,
}

impl RawSkill {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            proficiency: None,
            category: None,
        }
    }

    pub fn with_proficiency(mut self, proficiency: f32) -> Self {
        self.proficiency = Some(proficiency);
        self
    }

    pub fn with_category(mut self, category: SkillCategory) -> Self {
        self.category = Some(category);
        self
    }
}

/// A normalized, deduplicated skill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    /// Canonical display form
    pub name: String,
    /// Dedup key; never shown to users
    pub normalized_key: String,
    pub category: SkillCategory,
    #[serde(default)]
    pub proficiency: Option<f32>,
}

impl Skill {
    /// Proficiency with missing values treated as zero
    pub fn proficiency_or_zero(&self) -> f32 {
        self.proficiency.unwrap_or(0.0)
    }
}

impl From<&Skill> for RawSkill {
    fn from(skill: &Skill) -> Self {
        Self {
            name: skill.name.clone(),
            proficiency: skill.proficiency,
            category: Some(skill.category),
        }
    }
}

/// One work-history range
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkExperience {
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_date")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "deserialize_flexible_date")]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub is_current: bool,
    #[serde(default)]
    pub description: Option<String>,
}

impl WorkExperience {
    /// A closed range
    pub fn between(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start_date: Some(start),
            end_date: Some(end),
            ..Default::default()
        }
    }

    /// An ongoing position
    pub fn current_since(start: NaiveDate) -> Self {
        Self {
            start_date: Some(start),
            is_current: true,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Education {
    #[serde(default)]
    pub institution: Option<String>,
    #[serde(default)]
    pub degree: Option<String>,
    #[serde(default)]
    pub field_of_study: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certification {
    pub name: String,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub issued: Option<String>,
}

/// Output of the structured parsing engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredResume {
    #[serde(default)]
    pub skills: Vec<RawSkill>,
    #[serde(default)]
    pub work_experience: Vec<WorkExperience>,
    #[serde(default)]
    pub education: Vec<Education>,
    #[serde(default)]
    pub certifications: Vec<Certification>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub raw_text: String,
    #[serde(default)]
    pub confidence: f32,
}

/// Structured resume data stored once per candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedResumeData {
    pub candidate_id: String,
    pub skills: Vec<Skill>,
    pub work_experience: Vec<WorkExperience>,
    pub education: Vec<Education>,
    pub certifications: Vec<Certification>,
    pub summary: Option<String>,
    pub raw_text: String,
    pub parsing_confidence: f32,
    pub created_at: DateTime<Utc>,
}

/// Derived values written back to the candidate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateAggregate {
    /// Years, one decimal
    pub total_experience: f64,
}
