//! Persistent result cache keyed by normalized identifier.
//!
//! This module provides SQLite-backed caching of resolved records. Either
//! identifier form of a work maps to the same logical entry: 10-digit
//! identifiers are enriched to their 13-digit form on write, so reads by
//! either form hit one row.
//!
//! Staleness is a read-side concept: entries at least as old as the window
//! are treated as cache misses but are never deleted, so rescan passes can
//! still iterate and upgrade them.
//!
//! # Example
//!
//! ```ignore
//! use bookmeta_core::{Database, MetadataCache};
//! use std::time::Duration;
//!
//! let db = Database::new_in_memory().await?;
//! let cache = MetadataCache::new(db, Duration::from_secs(30 * 24 * 3600));
//! if let Some(record) = cache.get(&isbn).await? {
//!     // fresh hit, no network needed
//! }
//! ```

mod entry;
mod error;

pub use entry::CacheEntry;
pub use error::CacheError;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, instrument};

use crate::db::Database;
use crate::isbn::Isbn;
use crate::record::Record;

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// SQLite-backed cache of resolved records.
///
/// Cloneable handle over the shared connection pool; safe for concurrent use
/// from all workers (the upsert is a single statement).
#[derive(Debug, Clone)]
pub struct MetadataCache {
    db: Database,
    fresh_window: Duration,
}

const SELECT_COLUMNS: &str = "id, isbn13, isbn10, title, authors, publisher, published, \
     confidence, source, payload, fetched_at, error_count, last_error";

impl MetadataCache {
    /// Creates a cache handle with the given freshness window.
    #[must_use]
    pub fn new(db: Database, fresh_window: Duration) -> Self {
        Self { db, fresh_window }
    }

    /// Returns the configured freshness window.
    #[must_use]
    pub fn fresh_window(&self) -> Duration {
        self.fresh_window
    }

    /// Looks up the entry for either identifier form.
    ///
    /// Returns `None` for a missing row, a stale row (past the freshness
    /// window), or an error-only row that has never held a record. A corrupt
    /// payload degrades to column reconstruction and is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Database`] if the query fails.
    #[instrument(skip(self), fields(isbn = %isbn))]
    pub async fn get(&self, isbn: &Isbn) -> Result<Option<Record>> {
        let Some(entry) = self.lookup_row(isbn).await? else {
            return Ok(None);
        };

        #[allow(clippy::cast_possible_wrap)]
        let window_secs = self.fresh_window.as_secs() as i64;
        if !entry.is_fresh(now_epoch(), window_secs) {
            debug!(isbn13 = %entry.isbn13, fetched_at = entry.fetched_at, "cache entry stale");
            return Ok(None);
        }

        Ok(entry.record())
    }

    /// Upserts a record, keyed by whichever identifier forms it carries.
    ///
    /// The full serialized payload and the denormalized columns are written
    /// together; the error counter of an existing row is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::MissingIdentifier`] when the record carries no
    /// parseable identifier, [`CacheError::Serialization`] if the payload
    /// cannot be serialized, or [`CacheError::Database`] on write failure.
    #[instrument(skip(self, record), fields(source = %record.source))]
    pub async fn set(&self, record: &Record) -> Result<()> {
        let (isbn13, isbn10) = cache_key(record)?;
        let payload = serde_json::to_string(record)?;

        sqlx::query(
            "INSERT INTO metadata_cache \
                 (isbn13, isbn10, title, authors, publisher, published, \
                  confidence, source, payload, fetched_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
             ON CONFLICT(isbn13) DO UPDATE SET \
                 isbn10 = excluded.isbn10, \
                 title = excluded.title, \
                 authors = excluded.authors, \
                 publisher = excluded.publisher, \
                 published = excluded.published, \
                 confidence = excluded.confidence, \
                 source = excluded.source, \
                 payload = excluded.payload, \
                 fetched_at = excluded.fetched_at",
        )
        .bind(&isbn13)
        .bind(&isbn10)
        .bind(&record.title)
        .bind(record.authors_joined())
        .bind(&record.publisher)
        .bind(&record.published)
        .bind(record.confidence)
        .bind(&record.source)
        .bind(&payload)
        .bind(now_epoch())
        .execute(self.db.pool())
        .await?;

        debug!(isbn13 = %isbn13, confidence = record.confidence, "cache entry written");
        Ok(())
    }

    /// Replaces the stored entry only when the new record's confidence
    /// strictly exceeds the stored one. Inserts when no entry exists.
    ///
    /// Returns `true` when the entry was written. This is the rescan path:
    /// lower-confidence data never destructively overwrites a better entry.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`MetadataCache::set`].
    #[instrument(skip(self, record), fields(source = %record.source, confidence = record.confidence))]
    pub async fn update_if_better(&self, record: &Record) -> Result<bool> {
        let (isbn13, isbn10) = cache_key(record)?;
        let payload = serde_json::to_string(record)?;

        let result = sqlx::query(
            "INSERT INTO metadata_cache \
                 (isbn13, isbn10, title, authors, publisher, published, \
                  confidence, source, payload, fetched_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
             ON CONFLICT(isbn13) DO UPDATE SET \
                 isbn10 = excluded.isbn10, \
                 title = excluded.title, \
                 authors = excluded.authors, \
                 publisher = excluded.publisher, \
                 published = excluded.published, \
                 confidence = excluded.confidence, \
                 source = excluded.source, \
                 payload = excluded.payload, \
                 fetched_at = excluded.fetched_at \
             WHERE excluded.confidence > metadata_cache.confidence",
        )
        .bind(&isbn13)
        .bind(&isbn10)
        .bind(&record.title)
        .bind(record.authors_joined())
        .bind(&record.publisher)
        .bind(&record.published)
        .bind(record.confidence)
        .bind(&record.source)
        .bind(&payload)
        .bind(now_epoch())
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Increments the error counter for an identifier and stores the most
    /// recent error text, without touching any stored record.
    ///
    /// Creates a payload-less row (never considered fresh) when the
    /// identifier has no entry yet.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Database`] if the write fails.
    #[instrument(skip(self, message), fields(isbn = %isbn))]
    pub async fn record_error(&self, isbn: &Isbn, message: &str) -> Result<()> {
        let thirteen = isbn.to_isbn13();
        let ten = isbn.to_isbn10();

        sqlx::query(
            "INSERT INTO metadata_cache (isbn13, isbn10, fetched_at, error_count, last_error) \
             VALUES (?1, ?2, 0, 1, ?3) \
             ON CONFLICT(isbn13) DO UPDATE SET \
                 error_count = error_count + 1, \
                 last_error = excluded.last_error",
        )
        .bind(thirteen.as_str())
        .bind(ten.as_ref().map(Isbn::as_str))
        .bind(message)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    /// Returns the error counter for an identifier (0 when no row exists).
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Database`] if the query fails.
    pub async fn error_count(&self, isbn: &Isbn) -> Result<i64> {
        let thirteen = isbn.to_isbn13();
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT error_count FROM metadata_cache WHERE isbn13 = ?1")
                .bind(thirteen.as_str())
                .fetch_optional(self.db.pool())
                .await?;
        Ok(row.map_or(0, |(count,)| count))
    }

    /// Iterates all entries regardless of staleness.
    ///
    /// Rescan passes use this to find rows the read path would treat as
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn entries(&self) -> Result<Vec<CacheEntry>> {
        let rows = sqlx::query_as::<_, CacheEntry>(&format!(
            "SELECT {SELECT_COLUMNS} FROM metadata_cache ORDER BY id"
        ))
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows)
    }

    async fn lookup_row(&self, isbn: &Isbn) -> Result<Option<CacheEntry>> {
        let thirteen = isbn.to_isbn13();
        let row = sqlx::query_as::<_, CacheEntry>(&format!(
            "SELECT {SELECT_COLUMNS} FROM metadata_cache \
             WHERE isbn13 = ?1 OR isbn10 = ?2 \
             ORDER BY fetched_at DESC LIMIT 1"
        ))
        .bind(thirteen.as_str())
        .bind(isbn.as_str())
        .fetch_optional(self.db.pool())
        .await?;
        Ok(row)
    }
}

/// Current wall-clock time as unix-epoch seconds.
#[allow(clippy::cast_possible_wrap)]
fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs() as i64)
}

/// Derives the (isbn13, isbn10) key pair for a record.
fn cache_key(record: &Record) -> Result<(String, Option<String>)> {
    let parsed = record
        .isbn13
        .as_deref()
        .or(record.isbn10.as_deref())
        .and_then(|raw| Isbn::parse(raw).ok());

    let Some(parsed) = parsed else {
        return Err(CacheError::MissingIdentifier {
            source_name: record.source.clone(),
        });
    };

    let thirteen = parsed.to_isbn13();
    let ten = record
        .isbn10
        .clone()
        .or_else(|| parsed.to_isbn10().map(|t| t.as_str().to_string()));
    Ok((thirteen.as_str().to_string(), ten))
}
