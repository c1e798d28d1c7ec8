//! Bookmeta Core Library
//!
//! This library resolves bibliographic metadata (title, authors, publisher,
//! published date, identifiers) for books given candidate ISBN strings, by
//! querying a set of external lookup sources with very different reliability,
//! latency, and rate limits, and by combining and caching the results.
//!
//! # Architecture
//!
//! The library is organized into the following modules, leaf-first:
//! - [`isbn`] - Identifier normalization and checksum validation
//! - [`db`] - Database connection and schema management
//! - [`cache`] - Persistent result cache keyed by identifier
//! - [`health`] - Per-source call statistics and rate-limit pacing
//! - [`source`] - Uniform lookup adapters for external catalogs
//! - [`orchestrator`] - Tiered fallback resolution with retry and merge
//! - [`engine`] - Bounded worker pool driving resolution across identifiers
//!
//! Document parsing/OCR and file renaming are upstream/downstream
//! collaborators and are out of scope here.

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod config;
pub mod db;
pub mod engine;
pub mod health;
pub mod isbn;
pub mod merge;
pub mod orchestrator;
pub mod record;
pub mod source;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use cache::{CacheEntry, CacheError, MetadataCache};
pub use config::{ResolveConfig, SourceConfig, TierConfig};
pub use db::Database;
pub use engine::{DEFAULT_CONCURRENCY, EngineError, ResolveEngine, ResolveStats};
pub use health::{HealthSnapshot, HealthTracker};
pub use isbn::{Isbn, IsbnError, is_known_variant};
pub use merge::merge_records;
pub use orchestrator::{Orchestrator, Resolution, ResolveError};
pub use record::Record;
pub use source::{
    Lookup, SourceAdapter, SourceError, SourceErrorKind, SourceRegistry,
    build_default_source_registry,
};
