//! Combining multiple same-work records into one higher-confidence record.
//!
//! Input records are presumed to describe the same work and must be ordered
//! by descending confidence; the first is the base and at most two further
//! records contribute. Field adoption is conservative (a field is only
//! replaced by a strictly more informative value that passes validation) and
//! independent-source agreement is rewarded as corroboration.
//!
//! Author comparison is exact string set-equality. Lists that differ only by
//! formatting ("J. Bloch" vs "Joshua Bloch") neither corroborate nor dedupe;
//! this mirrors the observed behavior of the catalogs involved and is a known
//! limitation, kept rather than replaced by a guessed fuzzy rule.

use std::collections::HashSet;

use tracing::debug;

use crate::record::{Record, looks_like_date, looks_like_title};

/// Confidence added per field actually changed by a contributing record.
const FIELD_CHANGE_BOOST: f64 = 0.02;

/// Confidence added when a contributing record's title matches the base
/// title exactly (case-insensitive).
const TITLE_AGREEMENT_BOOST: f64 = 0.05;

/// Confidence added when a contributing record's author set matches exactly.
const AUTHOR_AGREEMENT_BOOST: f64 = 0.03;

/// How many records beyond the base may contribute.
const MAX_CONTRIBUTORS: usize = 2;

/// Merges 2-3 records ordered by descending confidence into one record.
///
/// Returns `None` when fewer than two records are supplied; merging a single
/// record is meaningless and the caller should use it directly.
///
/// The merged record's provenance becomes `"<base-source>+merged"` and its
/// confidence is capped at 1.0.
#[must_use]
pub fn merge_records(records: &[Record]) -> Option<Record> {
    if records.len() < 2 {
        return None;
    }

    let mut merged = records[0].clone();
    let base_source = merged.source.clone();

    for contributor in records.iter().skip(1).take(MAX_CONTRIBUTORS) {
        let mut fields_changed = 0u32;

        // Title: exact agreement corroborates; otherwise adopt only a
        // strictly longer, plausible title.
        if contributor.title.eq_ignore_ascii_case(&merged.title) {
            merged.confidence += TITLE_AGREEMENT_BOOST;
        } else if contributor.title.chars().count() > merged.title.chars().count()
            && looks_like_title(&contributor.title)
        {
            merged.title = contributor.title.clone();
            fields_changed += 1;
        }

        // Authors: set agreement corroborates; otherwise union, preserving
        // base order and appending only authors not already present.
        let merged_set: HashSet<&str> = merged.authors.iter().map(String::as_str).collect();
        let contributor_set: HashSet<&str> =
            contributor.authors.iter().map(String::as_str).collect();
        if !contributor_set.is_empty() && contributor_set == merged_set {
            merged.confidence += AUTHOR_AGREEMENT_BOOST;
        } else {
            let missing: Vec<String> = contributor
                .authors
                .iter()
                .filter(|a| !merged_set.contains(a.as_str()))
                .cloned()
                .collect();
            if !missing.is_empty() {
                merged.authors.extend(missing);
                fields_changed += 1;
            }
        }

        // Published date: adopt only a strictly longer, valid textual form.
        if contributor.published.chars().count() > merged.published.chars().count()
            && looks_like_date(&contributor.published)
        {
            merged.published = contributor.published.clone();
            fields_changed += 1;
        }

        // Identifiers: fill gaps, never overwrite.
        if merged.isbn10.is_none() && contributor.isbn10.is_some() {
            merged.isbn10 = contributor.isbn10.clone();
            fields_changed += 1;
        }
        if merged.isbn13.is_none() && contributor.isbn13.is_some() {
            merged.isbn13 = contributor.isbn13.clone();
            fields_changed += 1;
        }

        if merged.publisher.trim().is_empty() && !contributor.publisher.trim().is_empty() {
            merged.publisher = contributor.publisher.clone();
            fields_changed += 1;
        }

        merged.confidence += FIELD_CHANGE_BOOST * f64::from(fields_changed);

        debug!(
            contributor = %contributor.source,
            fields_changed,
            confidence = merged.confidence,
            "merged contributor record"
        );
    }

    merged.clamp_confidence();
    merged.source = format!("{base_source}+merged");
    Some(merged)
}
