//! Total-experience aggregation over work-history ranges

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer};

use crate::types::WorkExperience;

/// Whole months covered by one range, clamped at zero.
///
/// Only year and month take part; days are ignored.
pub fn months_in_range(entry: &WorkExperience, now: NaiveDate) -> Option<i64> {
    let start = entry.start_date?;
    let end = if entry.is_current {
        now
    } else {
        entry.end_date.unwrap_or(now)
    };

    let months = (end.year() as i64 - start.year() as i64) * 12
        + (end.month() as i64 - start.month() as i64);
    Some(months.max(0))
}

/// Sum of months across all countable entries
pub fn total_months(entries: &[WorkExperience], now: NaiveDate) -> i64 {
    entries
        .iter()
        .filter_map(|entry| months_in_range(entry, now))
        .sum()
}

/// Total years of experience, rounded to one decimal.
///
/// Entries without a start date are skipped. Overlapping ranges are summed,
/// not merged.
pub fn total_experience_years(entries: &[WorkExperience], now: NaiveDate) -> f64 {
    let months = total_months(entries, now);
    round_one_decimal(months as f64 / 12.0)
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Parse the date shapes structured parsers tend to emit.
///
/// Accepts `YYYY-MM-DD`, `YYYY-MM`, `YYYY/MM`, `MM/YYYY`, `YYYY` and RFC 3339
/// timestamps. Partial dates resolve to the first day of the period. Words
/// like "present" yield `None`.
pub fn parse_flexible_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }

    if let Ok(ts) = chrono::DateTime::parse_from_rfc3339(value) {
        return Some(ts.date_naive());
    }

    let parts: Vec<&str> = value.split(['-', '/']).map(str::trim).collect();
    match parts.as_slice() {
        [year, month] if year.len() == 4 => ymd(year, month),
        [month, year] if year.len() == 4 => ymd(year, month),
        [year] if year.len() == 4 => ymd(year, "1"),
        _ => None,
    }
}

fn ymd(year: &str, month: &str) -> Option<NaiveDate> {
    let year: i32 = year.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, 1)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DateInput {
    Text(String),
    Year(i64),
}

/// Serde adapter for [`parse_flexible_date`]; unparseable values become `None`
pub fn deserialize_flexible_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let input: Option<DateInput> = Option::deserialize(deserializer)?;
    Ok(match input {
        Some(DateInput::Text(text)) => parse_flexible_date(&text),
        Some(DateInput::Year(year)) => i32::try_from(year)
            .ok()
            .and_then(|y| NaiveDate::from_ymd_opt(y, 1, 1)),
        None => None,
    })
}
