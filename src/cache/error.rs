//! Error types for cache operations.

use thiserror::Error;

/// Errors that can occur during cache operations.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Underlying database operation failed.
    #[error("cache database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The record payload could not be serialized for storage.
    #[error("failed to serialize record payload: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The record carries no identifier usable as a cache key.
    ///
    /// The field is deliberately not called `source`: thiserror reserves
    /// that name for error chaining.
    #[error("record from '{source_name}' has no valid identifier to key the cache entry")]
    MissingIdentifier {
        /// Provenance of the unkeyable record.
        source_name: String,
    },
}
