//! Bounded worker pool driving resolution across many identifiers.
//!
//! Concurrency exists only across identifiers: each worker runs one
//! identifier's resolution strictly sequentially, and a pacing sleep inside
//! it occupies the pool slot. That is deliberate - releasing the slot during
//! a pacing wait would let unbounded work pile up behind one slow source.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::cache::CacheError;
use crate::isbn::Isbn;
use crate::orchestrator::{Orchestrator, Resolution, ResolveError};

/// Default number of concurrent identifier resolutions.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Minimum allowed concurrency.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency; above this the shared sources become the
/// bottleneck anyway.
const MAX_CONCURRENCY: usize = 32;

/// Errors from the worker pool itself (per-identifier failures are reported
/// per identifier, not here).
#[derive(Error, Debug)]
pub enum EngineError {
    /// The requested concurrency is outside the supported range.
    #[error("concurrency {requested} outside supported range [{MIN_CONCURRENCY}, {MAX_CONCURRENCY}]")]
    InvalidConcurrency {
        /// The rejected value.
        requested: usize,
    },

    /// The semaphore closed while work was pending.
    #[error("worker pool closed while tasks were pending")]
    PoolClosed,

    /// A worker task panicked.
    #[error("worker task failed: {0}")]
    TaskFailed(String),

    /// Rescan could not enumerate the cache.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Monotonic counters across one engine's lifetime.
#[derive(Debug, Default)]
pub struct ResolveStats {
    resolved: AtomicU64,
    absent: AtomicU64,
    failed: AtomicU64,
}

impl ResolveStats {
    /// Identifiers resolved to a record.
    #[must_use]
    pub fn resolved(&self) -> u64 {
        self.resolved.load(Ordering::Relaxed)
    }

    /// Identifiers no source could resolve.
    #[must_use]
    pub fn absent(&self) -> u64 {
        self.absent.load(Ordering::Relaxed)
    }

    /// Identifiers whose resolution errored (invalid input, cache failure).
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    fn record(&self, outcome: &Result<Resolution, ResolveError>) {
        let counter = match outcome {
            Ok(Resolution::Found(_)) => &self.resolved,
            Ok(Resolution::Absent) => &self.absent,
            Err(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Semaphore-bounded pool running one orchestrator across many identifiers.
pub struct ResolveEngine {
    orchestrator: Arc<Orchestrator>,
    semaphore: Arc<Semaphore>,
    stats: Arc<ResolveStats>,
}

impl ResolveEngine {
    /// Creates an engine with the given concurrency bound.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] outside
    /// `[1, 32]`.
    pub fn new(orchestrator: Arc<Orchestrator>, concurrency: usize) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(EngineError::InvalidConcurrency {
                requested: concurrency,
            });
        }
        Ok(Self {
            orchestrator,
            semaphore: Arc::new(Semaphore::new(concurrency)),
            stats: Arc::new(ResolveStats::default()),
        })
    }

    /// Lifetime counters.
    #[must_use]
    pub fn stats(&self) -> &ResolveStats {
        &self.stats
    }

    /// Resolves a batch of raw identifiers concurrently.
    ///
    /// Results come back in input order, one per identifier; a failed
    /// identifier never aborts its siblings.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::PoolClosed`] or [`EngineError::TaskFailed`]
    /// only for pool-level faults.
    #[instrument(skip(self, identifiers, hint), fields(count = identifiers.len()))]
    pub async fn resolve_many(
        &self,
        identifiers: &[String],
        hint: Option<&str>,
    ) -> Result<Vec<(String, Result<Resolution, ResolveError>)>, EngineError> {
        let mut handles: Vec<JoinHandle<(String, Result<Resolution, ResolveError>)>> =
            Vec::with_capacity(identifiers.len());

        for raw in identifiers {
            // Acquire before spawning so the spawn loop itself applies
            // backpressure; the permit travels into the task.
            let permit = Arc::clone(&self.semaphore)
                .acquire_owned()
                .await
                .map_err(|_| EngineError::PoolClosed)?;

            let raw = raw.clone();
            let hint = hint.map(ToString::to_string);
            let orchestrator = Arc::clone(&self.orchestrator);
            let stats = Arc::clone(&self.stats);

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let outcome = orchestrator.resolve(&raw, hint.as_deref()).await;
                stats.record(&outcome);
                (raw, outcome)
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            let entry = handle
                .await
                .map_err(|error| EngineError::TaskFailed(error.to_string()))?;
            results.push(entry);
        }

        info!(
            resolved = self.stats.resolved(),
            absent = self.stats.absent(),
            failed = self.stats.failed(),
            "batch complete"
        );
        Ok(results)
    }

    /// Re-resolves every cached entry, stale or fresh, upgrading entries
    /// only on strict confidence improvement.
    ///
    /// Returns the number of entries that were re-resolved to a record.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Cache`] when the cache cannot be enumerated
    /// and [`EngineError::TaskFailed`] when a worker panics.
    #[instrument(skip(self))]
    pub async fn rescan(&self) -> Result<u64, EngineError> {
        let entries = self.orchestrator.cache().entries().await?;
        info!(entries = entries.len(), "rescanning cache");

        let mut handles: Vec<JoinHandle<bool>> = Vec::with_capacity(entries.len());
        for entry in entries {
            let Ok(isbn) = Isbn::parse(&entry.isbn13) else {
                warn!(isbn13 = %entry.isbn13, "unparseable cached identifier; skipping");
                continue;
            };
            let permit = Arc::clone(&self.semaphore)
                .acquire_owned()
                .await
                .map_err(|_| EngineError::PoolClosed)?;
            let orchestrator = Arc::clone(&self.orchestrator);
            let stats = Arc::clone(&self.stats);

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let outcome = orchestrator.rescan_identifier(&isbn, None).await;
                stats.record(&outcome);
                matches!(outcome, Ok(Resolution::Found(_)))
            }));
        }

        let mut refreshed = 0;
        for handle in handles {
            if handle
                .await
                .map_err(|error| EngineError::TaskFailed(error.to_string()))?
            {
                refreshed += 1;
            }
        }
        Ok(refreshed)
    }
}
