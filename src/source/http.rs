//! Shared HTTP client construction policy for source adapters.
//!
//! Centralizes networking defaults so adapters stay consistent on timeout,
//! user-agent, and compression. The client-level read timeout is a generous
//! outer bound; the adaptive per-call deadline is enforced by the
//! orchestrator with `tokio::time::timeout` around the whole lookup.

use std::time::Duration;

use reqwest::Client;

use super::SourceError;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const READ_TIMEOUT_SECS: u64 = 60;

/// Single shared user-agent for all adapters; no per-source name in the
/// header so traffic is not trivially fingerprintable per catalog.
#[must_use]
pub fn standard_user_agent() -> String {
    format!(
        "bookmeta/{} (metadata-resolver; +https://github.com/bookmeta/bookmeta)",
        env!("CARGO_PKG_VERSION")
    )
}

/// Builds an adapter HTTP client using shared project policy.
///
/// `source_name` is used only for error messages, not in the User-Agent
/// header.
///
/// # Errors
///
/// Returns [`SourceError`] when client construction fails.
pub fn build_source_http_client(source_name: &str) -> Result<Client, SourceError> {
    Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(READ_TIMEOUT_SECS))
        .user_agent(standard_user_agent())
        .gzip(true)
        .build()
        .map_err(|error| {
            SourceError::unexpected(
                source_name,
                format!("HTTP client construction failed: {error}"),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADAPTER_NAMES: &[&str] = &["google_books", "open_library", "isbndb", "loc", "openbd"];

    #[test]
    fn test_user_agent_shared_across_adapters() {
        let ua = standard_user_agent();
        assert!(ua.contains("bookmeta/"));
        for name in ADAPTER_NAMES {
            assert!(
                !ua.contains(name),
                "UA must not embed the adapter name '{name}'"
            );
        }
    }

    #[test]
    fn test_client_builds() {
        assert!(build_source_http_client("google_books").is_ok());
    }
}
