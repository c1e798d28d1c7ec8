//! openBD adapter - looks up identifiers via the openBD bulk API.
//!
//! openBD is the primary catalog for Japanese publications (region routing
//! moves it to the front of each tier for registration group 4). Queries
//! `GET /v1/get?isbn={isbn13}`; the response is an array with one element per
//! requested identifier, `null` for unknown ones.

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

/// Default openBD API base URL.
const DEFAULT_BASE_URL: &str = "https://api.openbd.jp";

/// Static reliability prior.
const CONFIDENCE_PRIOR: f64 = 0.90;

// ==================== openBD API Response Types ====================

/// One (nullable) element of the response array.
#[derive(Debug, Deserialize)]
pub(crate) struct OpenBdEntry {
    pub summary: Option<OpenBdSummary>,
}

/// The `summary` block carrying the flattened bibliographic fields.
#[derive(Debug, Deserialize)]
pub(crate) struct OpenBdSummary {
    pub isbn: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub pubdate: Option<String>,
}

// ==================== OpenBdAdapter ====================

/// Looks up identifiers via the openBD API.
#[derive(Debug)]
pub struct OpenBdAdapter {
    client: Client,
    base_url: String,
}

impl OpenBdAdapter {
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
            client: build_source_http_client("openbd")?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl SourceAdapter for OpenBdAdapter {
    fn name(&self) -> &str {
        "openbd"
    }

    fn confidence_prior(&self) -> f64 {
        CONFIDENCE_PRIOR
    }

    #[tracing::instrument(skip(self), fields(source = "openbd", isbn = %isbn))]
    async fn lookup(&self, isbn: &Isbn) -> Result<Lookup, SourceError> {
        let thirteen = isbn.to_isbn13();
        let url = format!(
            "{}/v1/get?isbn={}",
            self.base_url,
            urlencoding::encode(thirteen.as_str())
        );
        debug!(api_url = %url, "calling openBD API");

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

        let body: Vec<Option<OpenBdEntry>> = response.json().await.map_err(|e| {
            SourceError::malformed(self.name(), format!("unexpected response shape: {e}"))
        })?;

        let summary = body
            .into_iter()
            .flatten()
            .find_map(|entry| entry.summary);

        Ok(match summary.as_ref().and_then(|s| extract_record(s, &thirteen)) {
            Some(record) => Lookup::Found(finish_record(record, CONFIDENCE_PRIOR)),
            None => Lookup::Absent,
        })
    }
}

// ==================== Extraction ====================

fn extract_record(summary: &OpenBdSummary, queried: &Isbn) -> Option<Record> {
    let title = summary.title.clone().filter(|t| looks_like_title(t))?;

    let isbn13 = summary
        .isbn
        .clone()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| queried.as_str().to_string());

    Some(Record {
        title,
        authors: summary.author.as_deref().map(split_authors).unwrap_or_default(),
        publisher: summary.publisher.clone().unwrap_or_default(),
        published: summary.pubdate.as_deref().map(normalize_pubdate).unwrap_or_default(),
        isbn10: queried.to_isbn10().map(|t| t.as_str().to_string()),
        isbn13: Some(isbn13),
        confidence: 0.0,
        source: "openbd".to_string(),
    })
}

/// Splits the openBD author string.
///
/// The field packs entries as `名前／役割` separated by spaces (ASCII or
/// ideographic); the role suffix after `／` is dropped.
fn split_authors(field: &str) -> Vec<String> {
    field
        .split([' ', '\u{3000}'])
        .map(|chunk| chunk.split('／').next().unwrap_or("").trim())
        .filter(|name| !name.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Normalizes an openBD `pubdate` to hyphenated form.
///
/// The field is compact digits: `YYYYMMDD`, `YYYYMM`, or `YYYY`. Anything
/// else passes through untouched.
fn normalize_pubdate(pubdate: &str) -> String {
    let trimmed = pubdate.trim();
    if !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return trimmed.to_string();
    }
    match trimmed.len() {
        8 => format!("{}-{}-{}", &trimmed[..4], &trimmed[4..6], &trimmed[6..8]),
        6 => format!("{}-{}", &trimmed[..4], &trimmed[4..6]),
        _ => trimmed.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::start_mock_server_or_skip;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, ResponseTemplate};

    fn openbd_body() -> serde_json::Value {
        serde_json::json!([{
            "summary": {
                "isbn": "9784003101018",
                "title": "こころ",
                "author": "夏目漱石／著",
                "publisher": "岩波書店",
                "pubdate": "19890101"
            }
        }])
    }

    // ==================== Normalization Tests ====================

    #[test]
    fn test_split_authors_drops_role_suffix() {
        assert_eq!(split_authors("夏目漱石／著"), vec!["夏目漱石".to_string()]);
        assert_eq!(
            split_authors("著者A／著 著者B／訳"),
            vec!["著者A".to_string(), "著者B".to_string()]
        );
    }

    #[test]
    fn test_split_authors_ideographic_space() {
        assert_eq!(
            split_authors("著者A／著\u{3000}著者B／絵"),
            vec!["著者A".to_string(), "著者B".to_string()]
        );
    }

    #[test]
    fn test_normalize_pubdate_forms() {
        assert_eq!(normalize_pubdate("19890101"), "1989-01-01");
        assert_eq!(normalize_pubdate("198901"), "1989-01");
        assert_eq!(normalize_pubdate("1989"), "1989");
        assert_eq!(normalize_pubdate("1989-01-01"), "1989-01-01");
    }

    // ==================== Lookup Tests ====================

    #[tokio::test]
    async fn test_lookup_found_japanese_record() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("GET"))
            .and(path("/v1/get"))
            .and(query_param("isbn", "9784003101018"))
            .respond_with(ResponseTemplate::new(200).set_body_json(openbd_body()))
            .mount(&server)
            .await;

        let adapter = OpenBdAdapter::with_base_url(server.uri()).unwrap();
        let isbn = Isbn::parse("9784003101018").unwrap();
        let Lookup::Found(record) = adapter.lookup(&isbn).await.unwrap() else {
            panic!("expected a found record");
        };
        assert_eq!(record.title, "こころ");
        assert_eq!(record.authors, vec!["夏目漱石".to_string()]);
        assert_eq!(record.publisher, "岩波書店");
        assert_eq!(record.published, "1989-01-01");
        assert_eq!(record.isbn10.as_deref(), Some("4003101014"));
        assert!((record.confidence - CONFIDENCE_PRIOR).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_lookup_null_element_is_absent() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("GET"))
            .and(path("/v1/get"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([null])))
            .mount(&server)
            .await;

        let adapter = OpenBdAdapter::with_base_url(server.uri()).unwrap();
        let isbn = Isbn::parse("9784003101018").unwrap();
        assert!(matches!(adapter.lookup(&isbn).await.unwrap(), Lookup::Absent));
    }

    #[tokio::test]
    async fn test_lookup_server_error_is_rejected() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };

        Mock::given(method("GET"))
            .and(path("/v1/get"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let adapter = OpenBdAdapter::with_base_url(server.uri()).unwrap();
        let isbn = Isbn::parse("9784003101018").unwrap();
        let error = adapter.lookup(&isbn).await.unwrap_err();
        assert_eq!(error.kind(), super::super::SourceErrorKind::RejectedResponse);
    }
}
