//! Static resolution configuration.
//!
//! Everything here is deploy-time configuration, not CLI surface: the CLI
//! only picks a config file path and a concurrency level. `Default` gives the
//! shipped setup; a JSON file can override any subset of fields.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

/// Errors loading a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The file was not valid configuration JSON.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    /// The configuration is structurally unusable.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// What is wrong with it.
        reason: String,
    },
}

/// Per-source static settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Whether the source participates in resolution at all.
    pub enabled: bool,
    /// Lower clamp on the adaptive per-call timeout, in milliseconds.
    pub timeout_floor_ms: u64,
    /// Upper clamp on the adaptive per-call timeout, in milliseconds.
    pub timeout_ceiling_ms: u64,
    /// Retry budget per attempt; only timeouts consume it.
    pub max_retries: u32,
    /// Base pacing interval between calls, in milliseconds.
    pub pacing_ms: u64,
    /// Optional override of the adapter's built-in confidence prior.
    pub confidence_prior: Option<f64>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_floor_ms: 2_000,
            timeout_ceiling_ms: 30_000,
            max_retries: 2,
            pacing_ms: 1_000,
            confidence_prior: None,
        }
    }
}

impl SourceConfig {
    /// Adaptive-timeout floor as a `Duration`.
    #[must_use]
    pub fn timeout_floor(&self) -> Duration {
        Duration::from_millis(self.timeout_floor_ms)
    }

    /// Adaptive-timeout ceiling as a `Duration`.
    #[must_use]
    pub fn timeout_ceiling(&self) -> Duration {
        Duration::from_millis(self.timeout_ceiling_ms)
    }

    /// Base pacing interval as a `Duration`.
    #[must_use]
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}

/// One ordered fallback tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierConfig {
    /// Tier name, for logging.
    pub name: String,
    /// Source names queried in this tier, in order.
    pub sources: Vec<String>,
    /// Confidence at or above which the tier's result is accepted
    /// immediately.
    pub min_confidence: f64,
}

/// Full resolution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveConfig {
    /// Ordered fallback tiers; earlier tiers hold the more trusted sources.
    pub tiers: Vec<TierConfig>,
    /// Per-source overrides; sources not listed get `SourceConfig::default`.
    pub sources: HashMap<String, SourceConfig>,
    /// Cache freshness window in days.
    pub cache_fresh_days: u64,
    /// Minimum confidence a merged (or single-best) result must reach to be
    /// accepted at exhaustion.
    pub merge_min_confidence: f64,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            tiers: vec![
                TierConfig {
                    name: "primary".to_string(),
                    sources: vec!["isbndb".to_string(), "google_books".to_string()],
                    min_confidence: 0.85,
                },
                TierConfig {
                    name: "secondary".to_string(),
                    sources: vec!["openbd".to_string(), "open_library".to_string()],
                    min_confidence: 0.75,
                },
                TierConfig {
                    name: "fallback".to_string(),
                    sources: vec!["loc".to_string()],
                    min_confidence: 0.6,
                },
            ],
            sources: HashMap::new(),
            cache_fresh_days: 30,
            merge_min_confidence: 0.5,
        }
    }
}

impl ResolveConfig {
    /// Loads configuration from a JSON file; absent fields keep their
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file is unreadable, unparseable, or
    /// structurally unusable.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Settings for one source (defaults when not explicitly configured).
    #[must_use]
    pub fn source(&self, name: &str) -> SourceConfig {
        self.sources.get(name).cloned().unwrap_or_default()
    }

    /// Cache freshness window as a `Duration`.
    #[must_use]
    pub fn fresh_window(&self) -> Duration {
        Duration::from_secs(self.cache_fresh_days * 24 * 3600)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.tiers.is_empty() {
            return Err(ConfigError::Invalid {
                reason: "at least one tier is required".to_string(),
            });
        }
        for tier in &self.tiers {
            if tier.sources.is_empty() {
                return Err(ConfigError::Invalid {
                    reason: format!("tier '{}' lists no sources", tier.name),
                });
            }
            if !(0.0..=1.0).contains(&tier.min_confidence) {
                return Err(ConfigError::Invalid {
                    reason: format!("tier '{}' min_confidence out of [0,1]", tier.name),
                });
            }
        }
        Ok(())
    }
}
