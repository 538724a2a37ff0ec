//! Pure data-shaping steps applied to parser output before storage

pub mod experience;
pub mod skills;

pub use experience::{parse_flexible_date, total_experience_years, total_months};
pub use skills::{normalize_skills, normalized_key, with_proficiency};
