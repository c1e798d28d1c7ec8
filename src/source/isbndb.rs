//! ISBNdb adapter - looks up identifiers via the ISBNdb REST API.
//!
//! Queries `GET /book/{isbn13}` with the account API key in the
//! `Authorization` header. ISBNdb answers 404 for unknown identifiers, which
//! maps to an absent lookup; 401/403 (bad key) and 429 (plan rate limit) are
//! rejections the orchestrator will back off from.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::isbn::Isbn;
use crate::record::{Record, looks_like_title};

use super::http::build_source_http_client;
use super::{
    Lookup, SourceAdapter, SourceError, classify_reqwest_error, finish_record,
    rejection_for_status,
};

/// Default ISBNdb API base URL.
const DEFAULT_BASE_URL: &str = "https://api2.isbndb.com";

/// Static reliability prior; the highest of the shipped sources.
const CONFIDENCE_PRIOR: f64 = 0.93;

// ==================== ISBNdb API Response Types ====================

/// Top-level book response.
#[derive(Debug, Deserialize)]
pub(crate) struct BookResponse {
    pub book: Option<BookEntry>,
}

/// The `book` object.
#[derive(Debug, Deserialize)]
pub(crate) struct BookEntry {
    pub title: Option<String>,
    pub authors: Option<Vec<String>>,
    pub publisher: Option<String>,
    pub date_published: Option<String>,
    pub isbn: Option<String>,
    pub isbn13: Option<String>,
}

// ==================== IsbndbAdapter ====================

/// Looks up identifiers via the ISBNdb REST API.
pub struct IsbndbAdapter {
    client: Client,
    base_url: String,
    api_key: String,
}

impl IsbndbAdapter {
    /// Creates an adapter against the public API.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the key is empty or HTTP client
    /// construction fails.
    pub fn new(api_key: impl Into<String>) -> Result<Self, SourceError> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Creates an adapter with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the key is empty or HTTP client
    /// construction fails.
    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, SourceError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() || api_key.chars().any(char::is_control) {
            return Err(SourceError::unexpected(
                "isbndb",
                "API key is empty or contains control characters",
            ));
        }
        Ok(Self {
            client: build_source_http_client("isbndb")?,
            base_url: base_url.into(),
            api_key,
        })
    }
}

impl std::fmt::Debug for IsbndbAdapter {
    // The API key never appears in Debug output.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsbndbAdapter")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SourceAdapter for IsbndbAdapter {
    fn name(&self) -> &str {
        "isbndb"
    }

    fn confidence_prior(&self) -> f64 {
        CONFIDENCE_PRIOR
    }

    #[tracing::instrument(skip(self), fields(source = "isbndb", isbn = %isbn))]
    async fn lookup(&self, isbn: &Isbn) -> Result<Lookup, SourceError> {
        let thirteen = isbn.to_isbn13();
        let url = format!("{}/book/{}", self.base_url, thirteen.as_str());
        debug!(api_url = %url, "calling ISBNdb API");

        let response = self
            .client
            .get(&url)
            .header("Authorization", &self.api_key)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(self.name(), &e))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(Lookup::Absent);
        }
        if !status.is_success() {
            return Err(rejection_for_status(self.name(), status));
        }

        let body: BookResponse = response.json().await.map_err(|e| {
            SourceError::malformed(self.name(), format!("unexpected response shape: {e}"))
        })?;

        Ok(match body.book.as_ref().and_then(|b| extract_record(b, &thirteen)) {
            Some(record) => Lookup::Found(finish_record(record, CONFIDENCE_PRIOR)),
            None => Lookup::Absent,
        })
    }
}

// ==================== Extraction ====================

fn extract_record(book: &BookEntry, queried: &Isbn) -> Option<Record> {
    let title = book.title.clone().filter(|t| looks_like_title(t))?;

    Some(Record {
        title,
        authors: book.authors.clone().unwrap_or_default(),
        publisher: book.publisher.clone().unwrap_or_default(),
        published: book.date_published.clone().unwrap_or_default(),
        isbn10: book
            .isbn
            .clone()
            .or_else(|| queried.to_isbn10().map(|t| t.as_str().to_string())),
        isbn13: book
            .isbn13
            .clone()
            .or_else(|| Some(queried.as_str().to_string())),
        confidence: 0.0,
        source: "isbndb".to_string(),
    })
}
