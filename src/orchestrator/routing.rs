//! Static routing tables: regional source priority and publisher overrides.
//!
//! Both tables key off the canonical 13-digit identifier. Region routing
//! reorders tiers so catalogs that specialize in a registration group are
//! asked first; the publisher override replaces chronically wrong or
//! romanized publisher strings with the canonical name.

use crate::isbn::Isbn;

/// Registration group -> source names promoted to the front of every tier.
const REGION_PRIORITY: &[(char, &[&str])] = &[
    // Group 4 (Japan): openBD is the authoritative catalog.
    ('4', &["openbd"]),
];

struct PublisherOverride {
    /// Prefix of the 13-digit form this publisher registered.
    prefix: &'static str,
    /// Lowercase keyword matched against the document-origin hint.
    keyword: &'static str,
    /// Canonical publisher name.
    publisher: &'static str,
}

const PUBLISHER_OVERRIDES: &[PublisherOverride] = &[
    PublisherOverride {
        prefix: "978400",
        keyword: "iwanami",
        publisher: "Iwanami Shoten",
    },
    PublisherOverride {
        prefix: "9787111",
        keyword: "machine press",
        publisher: "China Machine Press",
    },
    PublisherOverride {
        prefix: "9787115",
        keyword: "posts & telecom",
        publisher: "Posts & Telecom Press",
    },
];

/// Source names to promote for this identifier's registration group.
#[must_use]
pub fn preferred_sources(isbn: &Isbn) -> &'static [&'static str] {
    let group = isbn.to_isbn13().registration_group();
    REGION_PRIORITY
        .iter()
        .find(|(g, _)| *g == group)
        .map_or(&[], |(_, sources)| sources)
}

/// Reorders a tier's source list so preferred sources come first.
///
/// Stable: preferred sources keep the preference order, the rest keep their
/// configured order. Names absent from the tier are not added.
#[must_use]
pub fn reorder_tier(sources: &[String], preferred: &[&str]) -> Vec<String> {
    if preferred.is_empty() {
        return sources.to_vec();
    }
    let mut ordered: Vec<String> = preferred
        .iter()
        .filter(|p| sources.iter().any(|s| s == *p))
        .map(ToString::to_string)
        .collect();
    for source in sources {
        if !ordered.contains(source) {
            ordered.push(source.clone());
        }
    }
    ordered
}

/// Canonical publisher name for this identifier, if an override applies.
///
/// Matches the publisher prefix of the 13-digit form first, then a keyword
/// in the document-origin hint.
#[must_use]
pub fn publisher_override(isbn: &Isbn, hint: Option<&str>) -> Option<&'static str> {
    let thirteen = isbn.to_isbn13();
    if let Some(entry) = PUBLISHER_OVERRIDES
        .iter()
        .find(|entry| thirteen.as_str().starts_with(entry.prefix))
    {
        return Some(entry.publisher);
    }

    let hint = hint?.to_lowercase();
    PUBLISHER_OVERRIDES
        .iter()
        .find(|entry| hint.contains(entry.keyword))
        .map(|entry| entry.publisher)
}
