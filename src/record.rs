//! Resolved metadata record and field plausibility checks.
//!
//! A [`Record`] is the unit every source adapter produces and the merge step
//! combines. Records are immutable by convention once returned from an
//! adapter; the orchestrator's publisher override is the single sanctioned
//! mutation, applied exactly once before the record is cached.

use chrono::Datelike;
use serde::{Deserialize, Serialize};

/// Earliest publication year accepted by date validation.
const MIN_PUBLICATION_YEAR: i32 = 1900;

/// Title strings that sources emit in place of real data.
const PLACEHOLDER_TITLES: [&str; 4] = ["unknown", "n/a", "untitled", "no title"];

/// Resolved bibliographic metadata for one work.
///
/// The serialized JSON form of this struct is the authoritative cache payload
/// (see [`crate::cache`]); field layout changes must stay
/// backward-deserializable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Best-known title.
    pub title: String,
    /// Ordered author list, as reported by the source.
    pub authors: Vec<String>,
    /// Publisher name, possibly empty when the source omits it.
    pub publisher: String,
    /// Best-effort published date: bare year, year-month, or full date.
    pub published: String,
    /// 10-digit identifier when one exists.
    pub isbn10: Option<String>,
    /// 13-digit identifier when known.
    pub isbn13: Option<String>,
    /// Confidence score in [0, 1].
    pub confidence: f64,
    /// Provenance tag: source name, or `"<source>+merged"` after a merge.
    pub source: String,
}

impl Record {
    /// Clamps the confidence score into [0, 1].
    pub fn clamp_confidence(&mut self) {
        self.confidence = self.confidence.clamp(0.0, 1.0);
    }

    /// Authors joined for display and for the denormalized cache column.
    #[must_use]
    pub fn authors_joined(&self) -> String {
        self.authors.join("; ")
    }
}

/// Returns true when a string is plausible as a real title.
///
/// Rejects near-empty strings and the placeholder values some catalogs emit
/// instead of omitting the field.
#[must_use]
pub fn looks_like_title(candidate: &str) -> bool {
    let trimmed = candidate.trim();
    if trimmed.chars().count() < 2 {
        return false;
    }
    let lowered = trimmed.to_lowercase();
    !PLACEHOLDER_TITLES.contains(&lowered.as_str())
}

/// Returns true for a plausible published-date string.
///
/// Accepts a bare year (`2008`), year-month (`2008-05`), or full date
/// (`2008-05-15`), with the year bounded to [1900, current year]. Sources
/// disagree wildly on date granularity, so anything finer is not required.
#[must_use]
pub fn looks_like_date(candidate: &str) -> bool {
    let trimmed = candidate.trim();
    let mut parts = trimmed.splitn(3, '-');

    let Some(year_part) = parts.next() else {
        return false;
    };
    if year_part.len() != 4 {
        return false;
    }
    let Ok(year) = year_part.parse::<i32>() else {
        return false;
    };
    if !(MIN_PUBLICATION_YEAR..=chrono::Utc::now().year()).contains(&year) {
        return false;
    }

    if let Some(month_part) = parts.next() {
        let Ok(month) = month_part.parse::<u32>() else {
            return false;
        };
        if month_part.len() > 2 || !(1..=12).contains(&month) {
            return false;
        }
    }
    if let Some(day_part) = parts.next() {
        let Ok(day) = day_part.parse::<u32>() else {
            return false;
        };
        if day_part.len() > 2 || !(1..=31).contains(&day) {
            return false;
        }
    }
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample_record() -> Record {
        Record {
            title: "Effective Java".to_string(),
            authors: vec!["Joshua Bloch".to_string()],
            publisher: "Addison-Wesley".to_string(),
            published: "2018".to_string(),
            isbn10: Some("0134685997".to_string()),
            isbn13: Some("9780134685991".to_string()),
            confidence: 0.9,
            source: "google_books".to_string(),
        }
    }

    // ==================== Record Tests ====================

    #[test]
    fn test_clamp_confidence_bounds() {
        let mut record = sample_record();
        record.confidence = 1.4;
        record.clamp_confidence();
        assert!((record.confidence - 1.0).abs() < f64::EPSILON);

        record.confidence = -0.2;
        record.clamp_confidence();
        assert!(record.confidence.abs() < f64::EPSILON);
    }

    #[test]
    fn test_authors_joined_format() {
        let mut record = sample_record();
        record.authors.push("Doug Lea".to_string());
        assert_eq!(record.authors_joined(), "Joshua Bloch; Doug Lea");
    }

    #[test]
    fn test_record_json_round_trip() {
        let record = sample_record();
        let json = serde_json::to_string(&record).unwrap();
        let back: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    // ==================== Title Validation Tests ====================

    #[test]
    fn test_looks_like_title_accepts_real_titles() {
        assert!(looks_like_title("Effective Java"));
        assert!(looks_like_title("  Go  "));
    }

    #[test]
    fn test_looks_like_title_rejects_short_and_empty() {
        assert!(!looks_like_title(""));
        assert!(!looks_like_title(" "));
        assert!(!looks_like_title("a"));
    }

    #[test]
    fn test_looks_like_title_rejects_placeholders_case_insensitive() {
        assert!(!looks_like_title("Unknown"));
        assert!(!looks_like_title("N/A"));
        assert!(!looks_like_title("UNTITLED"));
        assert!(!looks_like_title("no title"));
    }

    // ==================== Date Validation Tests ====================

    #[test]
    fn test_looks_like_date_accepts_all_granularities() {
        assert!(looks_like_date("2008"));
        assert!(looks_like_date("2008-05"));
        assert!(looks_like_date("2008-05-15"));
    }

    #[test]
    fn test_looks_like_date_year_bounds() {
        assert!(!looks_like_date("1899"));
        assert!(looks_like_date("1900"));
        assert!(!looks_like_date("2999"));
    }

    #[test]
    fn test_looks_like_date_rejects_malformed() {
        assert!(!looks_like_date(""));
        assert!(!looks_like_date("08"));
        assert!(!looks_like_date("May 2008"));
        assert!(!looks_like_date("2008-13"));
        assert!(!looks_like_date("2008-00"));
        assert!(!looks_like_date("2008-05-32"));
        assert!(!looks_like_date("2008-05-xx"));
    }
}
