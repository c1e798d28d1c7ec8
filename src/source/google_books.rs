//! Google Books adapter - looks up identifiers via the volumes search API.
//!
//! Queries `GET /books/v1/volumes?q=isbn:{isbn13}` and maps the first volume
//! of the response into a [`Record`]. An empty result set is an absent
//! lookup, not an error.

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

/// Default Google Books API base URL.
const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";

/// Static reliability prior.
const CONFIDENCE_PRIOR: f64 = 0.88;

// ==================== Google Books API Response Types ====================

/// Top-level volumes search response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VolumesResponse {
    pub total_items: Option<u32>,
    pub items: Option<Vec<Volume>>,
}

/// One volume entry.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Volume {
    pub volume_info: Option<VolumeInfo>,
}

/// The `volumeInfo` block of a volume.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VolumeInfo {
    pub title: Option<String>,
    pub authors: Option<Vec<String>>,
    pub publisher: Option<String>,
    pub published_date: Option<String>,
    pub industry_identifiers: Option<Vec<IndustryIdentifier>>,
}

/// An identifier entry from `industryIdentifiers`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IndustryIdentifier {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub identifier: Option<String>,
}

// ==================== GoogleBooksAdapter ====================

/// Looks up identifiers via the Google Books volumes API.
#[derive(Debug)]
pub struct GoogleBooksAdapter {
    client: Client,
    base_url: String,
}

impl GoogleBooksAdapter {
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
            client: build_source_http_client("google_books")?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl SourceAdapter for GoogleBooksAdapter {
    fn name(&self) -> &str {
        "google_books"
    }

    fn confidence_prior(&self) -> f64 {
        CONFIDENCE_PRIOR
    }

    #[tracing::instrument(skip(self), fields(source = "google_books", isbn = %isbn))]
    async fn lookup(&self, isbn: &Isbn) -> Result<Lookup, SourceError> {
        let thirteen = isbn.to_isbn13();
        let query = urlencoding::encode(thirteen.as_str()).into_owned();
        let url = format!("{}/books/v1/volumes?q=isbn:{query}", self.base_url);
        debug!(api_url = %url, "calling Google Books API");

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

        let body: VolumesResponse = response.json().await.map_err(|e| {
            SourceError::malformed(self.name(), format!("unexpected response shape: {e}"))
        })?;

        Ok(match extract_record(&body, &thirteen) {
            Some(record) => Lookup::Found(finish_record(record, CONFIDENCE_PRIOR)),
            None => Lookup::Absent,
        })
    }
}

// ==================== Extraction ====================

/// Maps the first usable volume into a record; `None` means no match.
fn extract_record(body: &VolumesResponse, queried: &Isbn) -> Option<Record> {
    if body.total_items == Some(0) {
        return None;
    }
    let info = body
        .items
        .as_deref()
        .unwrap_or(&[])
        .iter()
        .find_map(|v| v.volume_info.as_ref())?;

    let title = info.title.clone().filter(|t| looks_like_title(t))?;

    let (mut isbn10, mut isbn13) = (None, None);
    for entry in info.industry_identifiers.as_deref().unwrap_or(&[]) {
        match (entry.kind.as_deref(), entry.identifier.as_deref()) {
            (Some("ISBN_10"), Some(id)) => isbn10 = Some(id.to_string()),
            (Some("ISBN_13"), Some(id)) => isbn13 = Some(id.to_string()),
            _ => {}
        }
    }

    Some(Record {
        title,
        authors: info.authors.clone().unwrap_or_default(),
        publisher: info.publisher.clone().unwrap_or_default(),
        published: info.published_date.clone().unwrap_or_default(),
        isbn10: isbn10.or_else(|| queried.to_isbn10().map(|t| t.as_str().to_string())),
        isbn13: isbn13.or_else(|| Some(queried.as_str().to_string())),
        confidence: 0.0,
        source: "google_books".to_string(),
    })
}
