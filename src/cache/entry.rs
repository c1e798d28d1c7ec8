//! Cache row representation and payload/column reconstruction.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::warn;

use crate::record::Record;

/// One row of the `metadata_cache` table.
///
/// The `payload` column is the authoritative serialized [`Record`]; the
/// per-field columns are a denormalized index kept in sync on write and used
/// as a fallback when the payload cannot be parsed.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Row id.
    pub id: i64,
    /// Canonical 13-digit identifier (always present).
    pub isbn13: String,
    /// 10-digit identifier when one exists.
    pub isbn10: Option<String>,
    /// Denormalized title column.
    pub title: Option<String>,
    /// Denormalized authors column (joined with `"; "`).
    pub authors: Option<String>,
    /// Denormalized publisher column.
    pub publisher: Option<String>,
    /// Denormalized published-date column.
    pub published: Option<String>,
    /// Stored confidence score.
    pub confidence: f64,
    /// Provenance tag of the stored record.
    pub source: Option<String>,
    /// Authoritative serialized record payload.
    pub payload: Option<String>,
    /// Unix-epoch seconds of the last successful refresh.
    pub fetched_at: i64,
    /// Monotonically increasing resolution-error counter.
    pub error_count: i64,
    /// Most recent resolution error, if any.
    pub last_error: Option<String>,
}

impl CacheEntry {
    /// Returns true when the entry was refreshed within the freshness window.
    ///
    /// The comparison is strict: an entry exactly as old as the window is
    /// already stale, and a zero-width window therefore disables caching.
    #[must_use]
    pub fn is_fresh(&self, now_epoch: i64, window_secs: i64) -> bool {
        self.fetched_at > 0 && now_epoch - self.fetched_at < window_secs
    }

    /// Reconstructs the stored [`Record`].
    ///
    /// The serialized payload is the source of truth. A corrupt payload
    /// degrades to reconstruction from the denormalized columns rather than
    /// failing the read; a row with neither payload nor a title column (an
    /// error-only row) yields `None`.
    #[must_use]
    pub fn record(&self) -> Option<Record> {
        if let Some(payload) = &self.payload {
            match serde_json::from_str::<Record>(payload) {
                Ok(record) => return Some(record),
                Err(error) => {
                    warn!(
                        isbn13 = %self.isbn13,
                        error = %error,
                        "cache payload unparseable; reconstructing from columns"
                    );
                }
            }
        }

        let title = self.title.clone()?;
        Some(Record {
            title,
            authors: self
                .authors
                .as_deref()
                .map(|joined| joined.split("; ").map(ToString::to_string).collect())
                .unwrap_or_default(),
            publisher: self.publisher.clone().unwrap_or_default(),
            published: self.published.clone().unwrap_or_default(),
            isbn10: self.isbn10.clone(),
            isbn13: Some(self.isbn13.clone()),
            confidence: self.confidence,
            source: self.source.clone().unwrap_or_default(),
        })
    }
}
