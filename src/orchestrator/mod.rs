//! Tiered fallback resolution with retry, merge, and caching.
//!
//! The [`Orchestrator`] runs the per-identifier state machine: cache
//! short-circuit, then ordered tiers of sources with per-source bounded
//! retry, early exit as soon as any record clears its tier's confidence bar,
//! and a final merge of the best collected records when no single source
//! did. All health gating and pacing happens here; adapters never wait or
//! skip on their own.
//!
//! One resolution is strictly sequential. Concurrency exists only across
//! identifiers (see [`crate::engine`]).

mod routing;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::cache::{CacheError, MetadataCache};
use crate::config::{ResolveConfig, SourceConfig};
use crate::health::HealthTracker;
use crate::isbn::{Isbn, IsbnError};
use crate::merge::merge_records;
use crate::record::Record;
use crate::source::{Lookup, SourceAdapter, SourceError, SourceRegistry};

/// Confidence stamped onto a record whose publisher was overridden from the
/// canonical table.
const OVERRIDE_CONFIDENCE: f64 = 0.95;

/// How many of the best collected records feed the final merge.
const MERGE_TOP_N: usize = 3;

/// Bounds of the jittered sleep between timeout retries.
const RETRY_JITTER_MS: std::ops::RangeInclusive<u64> = 50..=250;

/// Outcome of one resolution.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// A record was resolved (and written to the cache).
    Found(Record),
    /// Every tier was exhausted without an acceptable record. Not an error:
    /// the identifier is valid, the catalogs just do not know it.
    Absent,
}

/// Errors that abort a resolution outright.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// The input failed structural validation; no network call is made.
    #[error(transparent)]
    InvalidIdentifier(#[from] IsbnError),

    /// The cache failed underneath the resolution.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Per-identifier resolution driver.
///
/// Cheap to clone pieces are shared via `Arc`; one orchestrator serves all
/// workers.
pub struct Orchestrator {
    cache: MetadataCache,
    health: Arc<HealthTracker>,
    registry: Arc<SourceRegistry>,
    config: ResolveConfig,
}

impl Orchestrator {
    /// Creates an orchestrator over shared cache, health, and registry
    /// handles.
    #[must_use]
    pub fn new(
        cache: MetadataCache,
        health: Arc<HealthTracker>,
        registry: Arc<SourceRegistry>,
        config: ResolveConfig,
    ) -> Self {
        Self {
            cache,
            health,
            registry,
            config,
        }
    }

    /// The shared cache handle (rescan iterates it).
    #[must_use]
    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }

    /// Resolves one raw identifier string.
    ///
    /// `hint` is an optional document-origin string (file path, OCR'd
    /// imprint) consulted by the publisher-override table.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::InvalidIdentifier`] for structurally invalid
    /// input and [`ResolveError::Cache`] when the cache fails; source
    /// failures never surface here, they are aggregated into the cache's
    /// error log.
    #[instrument(skip(self, hint), fields(raw = %raw))]
    pub async fn resolve(&self, raw: &str, hint: Option<&str>) -> Result<Resolution, ResolveError> {
        let isbn = Isbn::parse(raw)?;

        if let Some(record) = self.cache.get(&isbn).await? {
            debug!(isbn = %isbn, "fresh cache hit");
            return Ok(Resolution::Found(record));
        }

        self.run_tiers(&isbn, hint, WritePolicy::Replace).await
    }

    /// Re-resolves an already-cached identifier, upgrading the stored entry
    /// only when the new result's confidence strictly improves on it.
    ///
    /// Skips the freshness short-circuit: rescan exists to revisit entries
    /// the read path would happily serve or skip.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Orchestrator::resolve`].
    #[instrument(skip(self, hint), fields(isbn = %isbn))]
    pub async fn rescan_identifier(
        &self,
        isbn: &Isbn,
        hint: Option<&str>,
    ) -> Result<Resolution, ResolveError> {
        self.run_tiers(isbn, hint, WritePolicy::IfBetter).await
    }

    async fn run_tiers(
        &self,
        isbn: &Isbn,
        hint: Option<&str>,
        policy: WritePolicy,
    ) -> Result<Resolution, ResolveError> {
        let preferred = routing::preferred_sources(isbn);
        let mut tried: HashSet<String> = HashSet::new();
        let mut collected: Vec<Record> = Vec::new();
        let mut failures: Vec<String> = Vec::new();

        for tier in &self.config.tiers {
            // Tier-granular early exit: a record collected in an earlier
            // tier may already clear this tier's lower bar, making the
            // tier's own sources unnecessary.
            if let Some(best) = best_record(&collected)
                && best.confidence >= tier.min_confidence
            {
                info!(
                    tier = %tier.name,
                    confidence = best.confidence,
                    "early exit: collected record clears tier threshold"
                );
                let best = best.clone();
                return self.finalize(best, isbn, hint, policy).await;
            }

            for name in routing::reorder_tier(&tier.sources, preferred) {
                if !tried.insert(name.clone()) {
                    continue;
                }

                let source_config = self.config.source(&name);
                if !source_config.enabled {
                    debug!(source = %name, "source disabled by configuration");
                    continue;
                }
                let Some(adapter) = self.registry.get(&name) else {
                    debug!(source = %name, "source not registered; skipping");
                    continue;
                };
                if !self.health.is_healthy(&name).await {
                    debug!(source = %name, "source unhealthy; skipping without calling");
                    failures.push(format!("{name}: skipped (unhealthy)"));
                    continue;
                }

                match self.call_with_retry(&*adapter, &source_config, isbn).await {
                    Ok(Lookup::Found(record)) => {
                        let record = apply_prior_override(record, &source_config, &*adapter);
                        debug!(
                            source = %name,
                            confidence = record.confidence,
                            "source returned a record"
                        );
                        if record.confidence >= tier.min_confidence {
                            info!(
                                source = %name,
                                tier = %tier.name,
                                confidence = record.confidence,
                                "early exit: record clears tier threshold"
                            );
                            return self.finalize(record, isbn, hint, policy).await;
                        }
                        collected.push(record);
                    }
                    Ok(Lookup::Absent) => {
                        debug!(source = %name, "source has no match");
                    }
                    Err(error) => {
                        warn!(source = %name, error = %error, "source lookup failed");
                        failures.push(error.to_string());
                    }
                }
            }
        }

        // Exhaustion: merge the best of what was collected.
        collected.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        collected.truncate(MERGE_TOP_N);

        // A merged record must clear the minimum bar to be trusted; when it
        // does not (or only one record exists), the single best collected
        // record is still better than reporting nothing.
        let candidate = merge_records(&collected)
            .filter(|merged| merged.confidence >= self.config.merge_min_confidence)
            .or_else(|| collected.first().cloned());
        if let Some(candidate) = candidate {
            info!(
                confidence = candidate.confidence,
                source = %candidate.source,
                "accepting merged/best record at exhaustion"
            );
            return self.finalize(candidate, isbn, hint, policy).await;
        }

        let summary = if failures.is_empty() {
            "no source returned a record".to_string()
        } else {
            failures.join("; ")
        };
        info!(isbn = %isbn, summary = %summary, "resolution exhausted");
        self.cache.record_error(isbn, &summary).await?;
        Ok(Resolution::Absent)
    }

    /// Calls one source with pacing, an adaptive deadline, and bounded
    /// timeout retry.
    ///
    /// Only timeouts consume the retry budget, with a doubled deadline and a
    /// short jittered sleep per retry; connection failures and rejections
    /// abort the source for this attempt.
    async fn call_with_retry(
        &self,
        adapter: &dyn SourceAdapter,
        source_config: &SourceConfig,
        isbn: &Isbn,
    ) -> Result<Lookup, SourceError> {
        let name = adapter.name().to_string();
        let mut budget = self
            .health
            .timeout_for(
                &name,
                source_config.timeout_floor(),
                source_config.timeout_ceiling(),
            )
            .await;
        let mut retries = 0;

        loop {
            self.health.pace(&name, source_config.pacing()).await;

            let started = Instant::now();
            let outcome = tokio::time::timeout(budget, adapter.lookup(isbn)).await;
            let latency = started.elapsed();

            let result = outcome.unwrap_or_else(|_| {
                Err(SourceError::timeout(
                    &name,
                    format!("no response within {}ms", budget.as_millis()),
                ))
            });

            match result {
                Ok(lookup) => {
                    self.health.record_outcome(&name, true, latency).await;
                    return Ok(lookup);
                }
                Err(error) => {
                    self.health.record_outcome(&name, false, latency).await;
                    if error.is_retryable() && retries < source_config.max_retries {
                        retries += 1;
                        budget *= 2;
                        let jitter =
                            Duration::from_millis(rand::thread_rng().gen_range(RETRY_JITTER_MS));
                        debug!(
                            source = %name,
                            retry = retries,
                            budget_ms = budget.as_millis(),
                            jitter_ms = jitter.as_millis(),
                            "timeout; retrying with doubled deadline"
                        );
                        tokio::time::sleep(jitter).await;
                        continue;
                    }
                    return Err(error);
                }
            }
        }
    }

    /// Single funnel every accepted record passes through before the cache
    /// write: identifier backfill, publisher override, clamp.
    async fn finalize(
        &self,
        mut record: Record,
        isbn: &Isbn,
        hint: Option<&str>,
        policy: WritePolicy,
    ) -> Result<Resolution, ResolveError> {
        let thirteen = isbn.to_isbn13();
        if record.isbn13.is_none() {
            record.isbn13 = Some(thirteen.as_str().to_string());
        }
        if record.isbn10.is_none() {
            record.isbn10 = isbn.to_isbn10().map(|t| t.as_str().to_string());
        }

        if let Some(publisher) = routing::publisher_override(isbn, hint) {
            info!(
                isbn = %isbn,
                publisher = %publisher,
                "applying canonical publisher override"
            );
            record.publisher = publisher.to_string();
            record.confidence = OVERRIDE_CONFIDENCE;
        }
        record.clamp_confidence();

        match policy {
            WritePolicy::Replace => self.cache.set(&record).await?,
            WritePolicy::IfBetter => {
                let written = self.cache.update_if_better(&record).await?;
                debug!(isbn = %isbn, written, "rescan write gated on strict improvement");
            }
        }
        Ok(Resolution::Found(record))
    }
}

/// How an accepted record reaches the cache.
#[derive(Debug, Clone, Copy)]
enum WritePolicy {
    /// Normal resolution: the fresh result replaces whatever is stored.
    Replace,
    /// Rescan: only a strictly higher-confidence result is written.
    IfBetter,
}

/// Rescales a record's confidence when the configuration overrides the
/// adapter's built-in prior.
fn apply_prior_override(
    mut record: Record,
    source_config: &SourceConfig,
    adapter: &dyn SourceAdapter,
) -> Record {
    if let Some(prior) = source_config.confidence_prior {
        let built_in = adapter.confidence_prior();
        if built_in > f64::EPSILON {
            record.confidence = (record.confidence * prior / built_in).clamp(0.0, 1.0);
        }
    }
    record
}

fn best_record(collected: &[Record]) -> Option<&Record> {
    collected.iter().max_by(|a, b| {
        a.confidence
            .partial_cmp(&b.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    })
}
