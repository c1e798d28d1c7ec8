//! Error taxonomy for source lookups.
//!
//! Every failure an adapter can report is folded into the closed
//! [`SourceErrorKind`] set; the orchestrator's retry and skip decisions key
//! on the kind alone, never on message text.

use reqwest::StatusCode;
use thiserror::Error;

/// Classification of a failed source call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    /// The call exceeded its deadline. The only retryable kind.
    Timeout,
    /// Transport-level failure (DNS, refused connection, TLS). Skipped for
    /// the rest of the attempt without retry.
    Connection,
    /// The source answered but refused the request (auth, rate limit, 5xx).
    RejectedResponse,
    /// The source answered 200 with a body that did not match its schema.
    MalformedResponse,
    /// Anything that escaped the taxonomy above.
    Unexpected,
}

impl SourceErrorKind {
    /// Short stable label for logging and the cache `last_error` column.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connection => "connection",
            Self::RejectedResponse => "rejected",
            Self::MalformedResponse => "malformed",
            Self::Unexpected => "unexpected",
        }
    }
}

/// A failed lookup against one source.
#[derive(Error, Debug, Clone)]
#[error("{source_name} ({}): {message}", kind.label())]
pub struct SourceError {
    kind: SourceErrorKind,
    source_name: String,
    message: String,
}

impl SourceError {
    /// Creates an error of an explicit kind.
    #[must_use]
    pub fn new(
        kind: SourceErrorKind,
        source_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// The call exceeded its deadline.
    #[must_use]
    pub fn timeout(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Timeout, source_name, message)
    }

    /// Transport-level failure before any response arrived.
    #[must_use]
    pub fn connection(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Connection, source_name, message)
    }

    /// The source refused the request.
    #[must_use]
    pub fn rejected(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::RejectedResponse, source_name, message)
    }

    /// The response body did not match the source's schema.
    #[must_use]
    pub fn malformed(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::MalformedResponse, source_name, message)
    }

    /// Unclassified failure.
    #[must_use]
    pub fn unexpected(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Unexpected, source_name, message)
    }

    /// Classification of this failure.
    #[must_use]
    pub fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    /// Name of the source that failed.
    #[must_use]
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Human-readable detail.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Only timeouts are retried within an attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind == SourceErrorKind::Timeout
    }
}

/// Maps a reqwest transport error into the closed taxonomy.
#[must_use]
pub fn classify_reqwest_error(source_name: &str, error: &reqwest::Error) -> SourceError {
    if error.is_timeout() {
        SourceError::timeout(source_name, format!("request timed out: {error}"))
    } else if error.is_connect() {
        SourceError::connection(source_name, format!("connection failed: {error}"))
    } else if error.is_decode() {
        SourceError::malformed(source_name, format!("response body unreadable: {error}"))
    } else if error.is_status() {
        let detail = error
            .status()
            .map_or_else(|| "HTTP error".to_string(), |s| format!("HTTP {s}"));
        SourceError::rejected(source_name, detail)
    } else {
        SourceError::unexpected(source_name, error.to_string())
    }
}

/// Maps a non-success HTTP status into a [`SourceErrorKind::RejectedResponse`].
///
/// 404 is not a rejection; adapters map it to an absent result before calling
/// this.
#[must_use]
pub fn rejection_for_status(source_name: &str, status: StatusCode) -> SourceError {
    let reason = match status.as_u16() {
        401 | 403 => "authentication rejected".to_string(),
        429 => "rate limit exceeded".to_string(),
        code if code >= 500 => format!("service unavailable (HTTP {code})"),
        code => format!("unexpected HTTP {code}"),
    };
    SourceError::rejected(source_name, reason)
}
