//! Open Library adapter - looks up identifiers via the books API.
//!
//! Queries `GET /api/books?bibkeys=ISBN:{isbn13}&format=json&jscmd=data` and
//! maps the keyed entry into a [`Record`]. The API answers an empty JSON
//! object for unknown identifiers, which is an absent lookup.

use std::collections::HashMap;

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

/// Default Open Library base URL.
const DEFAULT_BASE_URL: &str = "https://openlibrary.org";

/// Static reliability prior.
const CONFIDENCE_PRIOR: f64 = 0.80;

// ==================== Open Library API Response Types ====================

/// One book entry from the `jscmd=data` response.
#[derive(Debug, Deserialize)]
pub(crate) struct OpenLibraryBook {
    pub title: Option<String>,
    pub authors: Option<Vec<NamedEntity>>,
    pub publishers: Option<Vec<NamedEntity>>,
    pub publish_date: Option<String>,
    pub identifiers: Option<OpenLibraryIdentifiers>,
}

/// A `{"name": ...}` entity (author or publisher).
#[derive(Debug, Deserialize)]
pub(crate) struct NamedEntity {
    pub name: Option<String>,
}

/// The `identifiers` block.
#[derive(Debug, Deserialize)]
pub(crate) struct OpenLibraryIdentifiers {
    pub isbn_10: Option<Vec<String>>,
    pub isbn_13: Option<Vec<String>>,
}

// ==================== OpenLibraryAdapter ====================

/// Looks up identifiers via the Open Library books API.
#[derive(Debug)]
pub struct OpenLibraryAdapter {
    client: Client,
    base_url: String,
}

impl OpenLibraryAdapter {
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
            client: build_source_http_client("open_library")?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl SourceAdapter for OpenLibraryAdapter {
    fn name(&self) -> &str {
        "open_library"
    }

    fn confidence_prior(&self) -> f64 {
        CONFIDENCE_PRIOR
    }

    #[tracing::instrument(skip(self), fields(source = "open_library", isbn = %isbn))]
    async fn lookup(&self, isbn: &Isbn) -> Result<Lookup, SourceError> {
        let thirteen = isbn.to_isbn13();
        let bibkey = format!("ISBN:{}", thirteen.as_str());
        let url = format!(
            "{}/api/books?bibkeys={}&format=json&jscmd=data",
            self.base_url,
            urlencoding::encode(&bibkey)
        );
        debug!(api_url = %url, "calling Open Library API");

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

        let body: HashMap<String, OpenLibraryBook> = response.json().await.map_err(|e| {
            SourceError::malformed(self.name(), format!("unexpected response shape: {e}"))
        })?;

        Ok(match body.get(&bibkey).and_then(|b| extract_record(b, &thirteen)) {
            Some(record) => Lookup::Found(finish_record(record, CONFIDENCE_PRIOR)),
            None => Lookup::Absent,
        })
    }
}

// ==================== Extraction ====================

fn extract_record(book: &OpenLibraryBook, queried: &Isbn) -> Option<Record> {
    let title = book.title.clone().filter(|t| looks_like_title(t))?;

    let names = |entities: Option<&[NamedEntity]>| -> Vec<String> {
        entities
            .unwrap_or(&[])
            .iter()
            .filter_map(|e| e.name.clone())
            .collect()
    };

    let authors = names(book.authors.as_deref());
    let publisher = names(book.publishers.as_deref())
        .into_iter()
        .next()
        .unwrap_or_default();

    let identifiers = book.identifiers.as_ref();
    let isbn10 = identifiers
        .and_then(|ids| ids.isbn_10.as_ref())
        .and_then(|list| list.first().cloned());
    let isbn13 = identifiers
        .and_then(|ids| ids.isbn_13.as_ref())
        .and_then(|list| list.first().cloned());

    Some(Record {
        title,
        authors,
        publisher,
        published: book.publish_date.clone().unwrap_or_default(),
        isbn10: isbn10.or_else(|| queried.to_isbn10().map(|t| t.as_str().to_string())),
        isbn13: isbn13.or_else(|| Some(queried.as_str().to_string())),
        confidence: 0.0,
        source: "open_library".to_string(),
    })
}
