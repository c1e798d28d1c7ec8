//! End-to-end resolution scenarios against wiremock-backed catalog APIs.
//!
//! These tests wire real adapters, the health tracker, the orchestrator and
//! the SQLite cache together, with only the HTTP surface mocked. Request
//! expectations (`expect(0)`/`expect(1)`) verify the tiering behavior: later
//! sources must never be contacted once an earlier one cleared its tier.

mod support;

use std::collections::HashMap;
use std::sync::Arc;

use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bookmeta_core::source::{GoogleBooksAdapter, LocAdapter, OpenBdAdapter, OpenLibraryAdapter};
use bookmeta_core::{
    Database, HealthTracker, Isbn, MetadataCache, Orchestrator, Resolution, ResolveConfig,
    SourceConfig, SourceRegistry, TierConfig,
};

use support::socket_guard::start_mock_server_or_skip;

// ==================== Fixtures ====================

/// A complete Google Books volume for Effective Java (9780134685991).
fn google_volumes_body() -> serde_json::Value {
    serde_json::json!({
        "totalItems": 1,
        "items": [{
            "volumeInfo": {
                "title": "Effective Java",
                "authors": ["Joshua Bloch"],
                "publisher": "Addison-Wesley",
                "publishedDate": "2018-01-06",
                "industryIdentifiers": [
                    {"type": "ISBN_10", "identifier": "0134685997"},
                    {"type": "ISBN_13", "identifier": "9780134685991"}
                ]
            }
        }]
    })
}

/// The same work as Open Library sees it; shorter date, same title/authors.
fn open_library_body() -> serde_json::Value {
    serde_json::json!({
        "ISBN:9780134685991": {
            "title": "Effective Java",
            "authors": [{"name": "Joshua Bloch"}],
            "publishers": [{"name": "Addison-Wesley"}],
            "publish_date": "2018",
            "identifiers": {
                "isbn_10": ["0134685997"],
                "isbn_13": ["9780134685991"]
            }
        }
    })
}

/// A complete openBD record for an Iwanami paperback (9784003101018).
fn openbd_body() -> serde_json::Value {
    serde_json::json!([{
        "summary": {
            "isbn": "9784003101018",
            "title": "こころ",
            "author": "夏目漱石／著",
            "publisher": "岩波文庫",
            "pubdate": "19890101"
        }
    }])
}

// ==================== Setup Helpers ====================

/// Source configuration with pacing and retry delays removed so tests run
/// at full speed.
fn fast_source() -> SourceConfig {
    SourceConfig {
        enabled: true,
        timeout_floor_ms: 200,
        timeout_ceiling_ms: 5000,
        max_retries: 0,
        pacing_ms: 0,
        confidence_prior: None,
    }
}

fn tier(name: &str, sources: &[&str], min_confidence: f64) -> TierConfig {
    TierConfig {
        name: name.to_string(),
        sources: sources.iter().map(ToString::to_string).collect(),
        min_confidence,
    }
}

fn test_config(tiers: Vec<TierConfig>) -> ResolveConfig {
    let mut sources = HashMap::new();
    for tier in &tiers {
        for name in &tier.sources {
            sources.insert(name.clone(), fast_source());
        }
    }
    ResolveConfig {
        tiers,
        sources,
        cache_fresh_days: 30,
        merge_min_confidence: 0.5,
    }
}

async fn build_orchestrator(registry: SourceRegistry, config: ResolveConfig) -> Orchestrator {
    let db = Database::new_in_memory().await.unwrap();
    let cache = MetadataCache::new(db, config.fresh_window());
    Orchestrator::new(
        cache,
        Arc::new(HealthTracker::new()),
        Arc::new(registry),
        config,
    )
}

fn registry_from(server: &MockServer, names: &[&str]) -> SourceRegistry {
    let mut registry = SourceRegistry::new();
    for name in names {
        match *name {
            "google_books" => registry.register(Arc::new(
                GoogleBooksAdapter::with_base_url(server.uri()).unwrap(),
            )),
            "open_library" => registry.register(Arc::new(
                OpenLibraryAdapter::with_base_url(server.uri()).unwrap(),
            )),
            "openbd" => {
                registry.register(Arc::new(OpenBdAdapter::with_base_url(server.uri()).unwrap()));
            }
            "loc" => {
                registry.register(Arc::new(LocAdapter::with_base_url(server.uri()).unwrap()));
            }
            other => panic!("unknown source in test registry: {other}"),
        }
    }
    registry
}

// ==================== Tier Early Exit and Caching ====================

#[tokio::test]
async fn test_primary_tier_hit_skips_fallback_and_caches() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };

    // Google Books answers; the Library of Congress must never be asked,
    // and the second resolve must be served from the cache.
    Mock::given(method("GET"))
        .and(path("/books/v1/volumes"))
        .and(query_param("q", "isbn:9780134685991"))
        .respond_with(ResponseTemplate::new(200).set_body_json(google_volumes_body()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"results": []})))
        .expect(0)
        .mount(&server)
        .await;

    let registry = registry_from(&server, &["google_books", "loc"]);
    let config = test_config(vec![
        tier("primary", &["google_books"], 0.85),
        tier("fallback", &["loc"], 0.6),
    ]);
    let orchestrator = build_orchestrator(registry, config).await;

    let Resolution::Found(record) = orchestrator.resolve("978-0-13-468599-1", None).await.unwrap()
    else {
        panic!("expected a found record");
    };
    assert_eq!(record.title, "Effective Java");
    assert_eq!(record.publisher, "Addison-Wesley");
    assert_eq!(record.source, "google_books");
    // Complete record scores exactly the adapter prior.
    assert!((record.confidence - 0.88).abs() < 1e-9);

    // Second resolution: fresh cache hit, no further HTTP traffic (the
    // expect(1) above fails at mock verification otherwise).
    let Resolution::Found(cached) = orchestrator.resolve("9780134685991", None).await.unwrap()
    else {
        panic!("expected a cached record");
    };
    assert_eq!(cached.title, "Effective Java");
    assert_eq!(cached.source, "google_books");
}

// ==================== Exhaustion Without a Record ====================

#[tokio::test]
async fn test_all_sources_absent_records_single_cache_error() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };

    Mock::given(method("GET"))
        .and(path("/books/v1/volumes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"totalItems": 0})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/books"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"results": []})))
        .mount(&server)
        .await;

    let registry = registry_from(&server, &["google_books", "open_library", "loc"]);
    let config = test_config(vec![
        tier("primary", &["google_books"], 0.85),
        tier("secondary", &["open_library"], 0.75),
        tier("fallback", &["loc"], 0.6),
    ]);
    let orchestrator = build_orchestrator(registry, config).await;

    let outcome = orchestrator.resolve("9780134685991", None).await.unwrap();
    assert!(matches!(outcome, Resolution::Absent));

    // One resolution attempt, one error row.
    let isbn = Isbn::parse("9780134685991").unwrap();
    assert_eq!(orchestrator.cache().error_count(&isbn).await.unwrap(), 1);
}

// ==================== Merge at Exhaustion ====================

#[tokio::test]
async fn test_agreeing_sources_merge_above_best_input() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };

    Mock::given(method("GET"))
        .and(path("/books/v1/volumes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(google_volumes_body()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/books"))
        .respond_with(ResponseTemplate::new(200).set_body_json(open_library_body()))
        .mount(&server)
        .await;

    // A tier bar no single source can reach forces collection of both
    // records and a merge at exhaustion.
    let registry = registry_from(&server, &["google_books", "open_library"]);
    let config = test_config(vec![tier(
        "primary",
        &["google_books", "open_library"],
        0.97,
    )]);
    let orchestrator = build_orchestrator(registry, config).await;

    let Resolution::Found(record) = orchestrator.resolve("9780134685991", None).await.unwrap()
    else {
        panic!("expected a merged record");
    };
    assert_eq!(record.source, "google_books+merged");
    assert_eq!(record.title, "Effective Java");
    assert_eq!(record.authors, vec!["Joshua Bloch".to_string()]);
    // The longer Google date survives the merge.
    assert_eq!(record.published, "2018-01-06");
    // Base 0.88 plus title (+0.05) and author-set (+0.03) corroboration.
    assert!((record.confidence - 0.96).abs() < 1e-9);
}

// ==================== Region Routing and Publisher Override ====================

#[tokio::test]
async fn test_japanese_identifier_prefers_openbd_and_overrides_publisher() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };

    // Registration group 4 promotes openBD ahead of Google Books within the
    // tier; openBD's full record clears the bar so Google is never called.
    Mock::given(method("GET"))
        .and(path("/v1/get"))
        .and(query_param("isbn", "9784003101018"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openbd_body()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/books/v1/volumes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"totalItems": 0})))
        .expect(0)
        .mount(&server)
        .await;

    let registry = registry_from(&server, &["google_books", "openbd"]);
    let config = test_config(vec![tier("primary", &["google_books", "openbd"], 0.85)]);
    let orchestrator = build_orchestrator(registry, config).await;

    let Resolution::Found(record) = orchestrator.resolve("9784003101018", None).await.unwrap()
    else {
        panic!("expected a found record");
    };
    assert_eq!(record.source, "openbd");
    assert_eq!(record.title, "こころ");
    // The 978-400 prefix maps to the canonical publisher name regardless of
    // the string the catalog returned.
    assert_eq!(record.publisher, "Iwanami Shoten");
    assert!((record.confidence - 0.95).abs() < 1e-9);
}

// ==================== Invalid Input ====================

#[tokio::test]
async fn test_invalid_identifier_fails_without_network_traffic() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };

    Mock::given(method("GET"))
        .and(path("/books/v1/volumes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(google_volumes_body()))
        .expect(0)
        .mount(&server)
        .await;

    let registry = registry_from(&server, &["google_books"]);
    let config = test_config(vec![tier("primary", &["google_books"], 0.85)]);
    let orchestrator = build_orchestrator(registry, config).await;

    // Bad checksum: rejected during parsing, before any source is asked.
    assert!(orchestrator.resolve("9780134685990", None).await.is_err());
}
