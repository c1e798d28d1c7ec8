//! Uniform lookup adapters for external bibliographic catalogs.
//!
//! This module provides an extensible adapter system that queries external
//! book-metadata sources through one narrow capability: look up a validated
//! identifier, get back a scored [`Record`], an explicit "no match", or a
//! classified error.
//!
//! # Architecture
//!
//! - [`SourceAdapter`] - Async trait that individual adapters implement
//! - [`SourceRegistry`] - Name-keyed collection of adapters
//! - [`Lookup`] - Tri-state result of one lookup ("no match" is not an error)
//! - [`SourceError`] / [`SourceErrorKind`] - Closed failure taxonomy
//! - [`GoogleBooksAdapter`] - Google Books volumes API
//! - [`OpenLibraryAdapter`] - Open Library books API
//! - [`IsbndbAdapter`] - ISBNdb REST API (requires an API key)
//! - [`LocAdapter`] - Library of Congress search API
//! - [`OpenBdAdapter`] - openBD Japanese catalog API
//!
//! Adapters are pure wire+parse: health gating, pacing, deadlines, and retry
//! all live in the orchestrator, so every adapter stays a stateless HTTP
//! client plus a response mapping.

mod error;
mod google_books;
mod http;
mod isbndb;
mod loc;
mod open_library;
mod openbd;

pub use error::{SourceError, SourceErrorKind, classify_reqwest_error, rejection_for_status};
pub use google_books::GoogleBooksAdapter;
pub use http::{build_source_http_client, standard_user_agent};
pub use isbndb::IsbndbAdapter;
pub use loc::LocAdapter;
pub use open_library::OpenLibraryAdapter;
pub use openbd::OpenBdAdapter;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::isbn::Isbn;
use crate::record::{Record, looks_like_date, looks_like_title};

/// Result of a single adapter lookup.
///
/// A source that answers cleanly with "no such book" yields
/// [`Lookup::Absent`], never an error; the error side is reserved for calls
/// that failed.
#[derive(Debug, Clone)]
pub enum Lookup {
    /// The source returned a usable record.
    Found(Record),
    /// The source answered and has no match for this identifier.
    Absent,
}

/// Trait that all lookup adapters implement.
///
/// # Object Safety
///
/// Uses `async_trait` to support dynamic dispatch via
/// `Arc<dyn SourceAdapter>`; native async traits are not object-safe, and the
/// registry needs a heterogeneous collection.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable source name (e.g. "google_books"), used as the health,
    /// pacing, and provenance key.
    fn name(&self) -> &str;

    /// Static reliability prior in [0,1]; per-record confidence scales this
    /// by field completeness.
    fn confidence_prior(&self) -> f64;

    /// Looks up one identifier against the source.
    async fn lookup(&self, isbn: &Isbn) -> Result<Lookup, SourceError>;
}

/// Scales a source's static prior by the completeness of the record.
///
/// Five field groups count: plausible title, any author, publisher, plausible
/// date, any identifier. A fully populated record scores exactly the prior;
/// each missing group costs a tenth of it.
#[must_use]
pub(crate) fn scale_by_completeness(prior: f64, record: &Record) -> f64 {
    let mut present = 0u32;
    if looks_like_title(&record.title) {
        present += 1;
    }
    if !record.authors.is_empty() {
        present += 1;
    }
    if !record.publisher.trim().is_empty() {
        present += 1;
    }
    if looks_like_date(&record.published) {
        present += 1;
    }
    if record.isbn13.is_some() || record.isbn10.is_some() {
        present += 1;
    }
    let completeness = f64::from(present) / 5.0;
    (prior * (0.5 + 0.5 * completeness)).clamp(0.0, 1.0)
}

/// Stamps the completeness-scaled confidence onto an assembled record.
pub(crate) fn finish_record(mut record: Record, prior: f64) -> Record {
    record.confidence = scale_by_completeness(prior, &record);
    record.clamp_confidence();
    record
}

/// Name-keyed collection of adapters.
///
/// Registration is additive and order-preserving; the orchestrator's tier
/// configuration references adapters by name.
#[derive(Default)]
pub struct SourceRegistry {
    adapters: Vec<Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter. A duplicate name replaces the earlier entry so
    /// tests can swap in mock adapters.
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.retain(|a| a.name() != adapter.name());
        self.adapters.push(adapter);
    }

    /// Looks up an adapter by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters
            .iter()
            .find(|a| a.name() == name)
            .map(Arc::clone)
    }

    /// Registered adapter names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    /// Number of registered adapters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Whether the registry holds no adapters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("adapters", &self.names())
            .finish()
    }
}

/// Builds the default adapter registry used by the CLI.
///
/// Registers the five shipped adapters in descending-prior order. An adapter
/// whose construction fails is skipped with a warning so the rest keep
/// working; ISBNdb is skipped entirely when no API key is configured.
#[must_use]
pub fn build_default_source_registry(isbndb_api_key: Option<&str>) -> SourceRegistry {
    let mut registry = SourceRegistry::new();

    match isbndb_api_key {
        Some(key) => match IsbndbAdapter::new(key) {
            Ok(adapter) => registry.register(Arc::new(adapter)),
            Err(error) => warn!(
                error = %error,
                "ISBNdb adapter unavailable; continuing with remaining sources"
            ),
        },
        None => warn!("no ISBNdb API key configured; ISBNdb source disabled"),
    }

    match OpenBdAdapter::new() {
        Ok(adapter) => registry.register(Arc::new(adapter)),
        Err(error) => warn!(
            error = %error,
            "openBD adapter unavailable; continuing with remaining sources"
        ),
    }

    match GoogleBooksAdapter::new() {
        Ok(adapter) => registry.register(Arc::new(adapter)),
        Err(error) => warn!(
            error = %error,
            "Google Books adapter unavailable; continuing with remaining sources"
        ),
    }

    match OpenLibraryAdapter::new() {
        Ok(adapter) => registry.register(Arc::new(adapter)),
        Err(error) => warn!(
            error = %error,
            "Open Library adapter unavailable; continuing with remaining sources"
        ),
    }

    match LocAdapter::new() {
        Ok(adapter) => registry.register(Arc::new(adapter)),
        Err(error) => warn!(
            error = %error,
            "Library of Congress adapter unavailable; continuing with remaining sources"
        ),
    }

    registry
}
