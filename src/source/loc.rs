//! Library of Congress adapter - looks up identifiers via the loc.gov
//! search API.
//!
//! Queries `GET /search/?q={isbn13}&fo=json` and maps the first result into
//! a [`Record`]. The catalog rarely carries a publisher field, so records
//! from this source score low on completeness; it sits in the last fallback
//! tier.

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

/// Default loc.gov base URL.
const DEFAULT_BASE_URL: &str = "https://www.loc.gov";

/// Static reliability prior; the lowest of the shipped sources.
const CONFIDENCE_PRIOR: f64 = 0.72;

// ==================== loc.gov API Response Types ====================

/// Top-level search response.
#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    pub results: Option<Vec<SearchResult>>,
}

/// One search result.
#[derive(Debug, Deserialize)]
pub(crate) struct SearchResult {
    pub title: Option<String>,
    pub contributor: Option<Vec<String>>,
    pub date: Option<String>,
}

// ==================== LocAdapter ====================

/// Looks up identifiers via the Library of Congress search API.
#[derive(Debug)]
pub struct LocAdapter {
    client: Client,
    base_url: String,
}

impl LocAdapter {
    /// Creates an adapter against the public API.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if HTTP client construction fails.
    pub fn new() -> Result<Self, SourceError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Creates an adapter with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if HTTP client construction fails.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, SourceError> {
        Ok(Self {
            client: build_source_http_client("loc")?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl SourceAdapter for LocAdapter {
    fn name(&self) -> &str {
        "loc"
    }

    fn confidence_prior(&self) -> f64 {
        CONFIDENCE_PRIOR
    }

    #[tracing::instrument(skip(self), fields(source = "loc", isbn = %isbn))]
    async fn lookup(&self, isbn: &Isbn) -> Result<Lookup, SourceError> {
        let thirteen = isbn.to_isbn13();
        let url = format!(
            "{}/search/?q={}&fo=json",
            self.base_url,
            urlencoding::encode(thirteen.as_str())
        );
        debug!(api_url = %url, "calling loc.gov search API");

        let response = self
            .client
            .get(&url)
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

        let body: SearchResponse = response.json().await.map_err(|e| {
            SourceError::malformed(self.name(), format!("unexpected response shape: {e}"))
        })?;

        let first = body
            .results
            .as_deref()
            .unwrap_or(&[])
            .iter()
            .find(|r| r.title.is_some());

        Ok(match first.and_then(|r| extract_record(r, &thirteen)) {
            Some(record) => Lookup::Found(finish_record(record, CONFIDENCE_PRIOR)),
            None => Lookup::Absent,
        })
    }
}

// ==================== Extraction ====================

fn extract_record(result: &SearchResult, queried: &Isbn) -> Option<Record> {
    let title = result.title.clone().filter(|t| looks_like_title(t))?;

    Some(Record {
        title,
        authors: result.contributor.clone().unwrap_or_default(),
        // loc.gov search results carry no publisher field.
        publisher: String::new(),
        published: result.date.clone().unwrap_or_default(),
        isbn10: queried.to_isbn10().map(|t| t.as_str().to_string()),
        isbn13: Some(queried.as_str().to_string()),
        confidence: 0.0,
        source: "loc".to_string(),
    })
}
