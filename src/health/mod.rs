//! Per-source call statistics, rate-limit pacing, and adaptive timeouts.
//!
//! This module provides the [`HealthTracker`], shared by all workers, which
//! keeps a rolling window of call outcomes for every lookup source and
//! derives three things from it:
//!
//! - **Pacing**: the minimum interval between calls to one source, scaled up
//!   multiplicatively by the recent failure count. Many sources fail in
//!   bursts tied to shared upstream outages, so backoff reacts to the burst,
//!   not only to per-call overload.
//! - **Health**: a source is optimistically healthy until enough samples are
//!   collected; after that a success rate below the low-water mark reports it
//!   unhealthy and the orchestrator skips it without calling.
//! - **Timeout budget**: the per-call deadline is derived from the source's
//!   rolling average latency, clamped to a configured floor/ceiling, widened
//!   while the source is failing and tightened while it is fast and reliable.
//!
//! State is tracked per source in a `DashMap` of `Arc`-wrapped entries so the
//! map shard lock is released before any await; pacing for different sources
//! never waits on each other.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Rolling window capacity per source; oldest samples are evicted.
const WINDOW_CAP: usize = 50;

/// Below this many samples a source is considered healthy unconditionally.
const MIN_SAMPLES: usize = 5;

/// Success rate below which a source is reported unhealthy.
const LOW_WATER_MARK: f64 = 0.3;

/// Success rate above which (with low latency) the timeout budget tightens.
const HIGH_WATER_MARK: f64 = 0.9;

/// How many trailing samples count toward the pacing failure scale.
const RECENT_FAILURE_LOOKBACK: usize = 5;

/// Multiplier applied to average latency when deriving the timeout budget.
const LATENCY_HEADROOM: u32 = 4;

/// Average latency under which a reliable source is considered fast.
const FAST_LATENCY: Duration = Duration::from_secs(1);

/// One observed call outcome.
#[derive(Debug, Clone, Copy)]
struct Sample {
    latency: Duration,
    success: bool,
}

/// Rolling statistics for one source. Created lazily on first use, never
/// deleted, decayed only by window eviction.
#[derive(Debug)]
struct SourceHealth {
    last_call: Option<Instant>,
    window: VecDeque<Sample>,
    enabled: bool,
}

impl SourceHealth {
    fn new() -> Self {
        Self {
            last_call: None,
            window: VecDeque::with_capacity(WINDOW_CAP),
            enabled: true,
        }
    }

    fn push(&mut self, sample: Sample) {
        if self.window.len() == WINDOW_CAP {
            self.window.pop_front();
        }
        self.window.push_back(sample);
    }

    fn success_rate(&self) -> f64 {
        if self.window.is_empty() {
            return 1.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let rate = self.window.iter().filter(|s| s.success).count() as f64
            / self.window.len() as f64;
        rate
    }

    fn avg_latency(&self) -> Option<Duration> {
        if self.window.is_empty() {
            return None;
        }
        let total: Duration = self.window.iter().map(|s| s.latency).sum();
        #[allow(clippy::cast_possible_truncation)]
        Some(total / self.window.len() as u32)
    }

    fn recent_failures(&self) -> u32 {
        #[allow(clippy::cast_possible_truncation)]
        let count = self
            .window
            .iter()
            .rev()
            .take(RECENT_FAILURE_LOOKBACK)
            .filter(|s| !s.success)
            .count() as u32;
        count
    }

    fn is_healthy(&self) -> bool {
        if !self.enabled {
            return false;
        }
        // Optimistic until we have seen enough calls to judge.
        if self.window.len() < MIN_SAMPLES {
            return true;
        }
        self.success_rate() >= LOW_WATER_MARK
    }
}

/// Point-in-time view of one source's health, for logging and tests.
#[derive(Debug, Clone)]
pub struct HealthSnapshot {
    /// Number of samples currently in the rolling window.
    pub samples: usize,
    /// Derived success rate over the window (1.0 when empty).
    pub success_rate: f64,
    /// Derived average latency over the window.
    pub avg_latency: Option<Duration>,
    /// Whether the source is administratively enabled.
    pub enabled: bool,
    /// Whether the source is currently reported healthy.
    pub healthy: bool,
}

/// Shared per-source health and pacing state.
///
/// Designed to be wrapped in `Arc` and mutated concurrently by all workers;
/// the rolling-window append and pacing stamp are the hot paths and are
/// synchronized per source, never globally.
#[derive(Debug, Default)]
pub struct HealthTracker {
    sources: DashMap<String, Arc<Mutex<SourceHealth>>>,
}

impl HealthTracker {
    /// Creates an empty tracker. Source entries appear lazily on first use.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the remaining pacing wait for a source.
    ///
    /// The effective interval is `pacing × (1 + recent failures)`: a source
    /// failing in a burst is slowed down multiplicatively before the next
    /// call. The first call to a source never waits.
    pub async fn should_wait(&self, source: &str, pacing: Duration) -> Duration {
        let state = self.state(source);
        let guard = state.lock().await;
        Self::remaining_wait(&guard, pacing)
    }

    /// Sleeps out the pacing interval for a source, then stamps the
    /// last-call time.
    ///
    /// Callers to the same source serialize here; different sources proceed
    /// independently. A worker occupies its pool slot while waiting, which
    /// is accepted (see the crate-level concurrency notes).
    #[instrument(skip(self), fields(source = %source))]
    pub async fn pace(&self, source: &str, pacing: Duration) {
        let state = self.state(source);
        // Hold the source lock across the sleep so concurrent callers to the
        // same source queue up behind the pacing interval.
        let mut guard = state.lock().await;
        let wait = Self::remaining_wait(&guard, pacing);
        if !wait.is_zero() {
            debug!(wait_ms = wait.as_millis(), "pacing wait before source call");
            tokio::time::sleep(wait).await;
        }
        guard.last_call = Some(Instant::now());
    }

    /// Appends a call outcome to the source's rolling window.
    pub async fn record_outcome(&self, source: &str, success: bool, latency: Duration) {
        let state = self.state(source);
        let mut guard = state.lock().await;
        guard.push(Sample { latency, success });
        guard.last_call = Some(Instant::now());

        let rate = guard.success_rate();
        if guard.window.len() >= MIN_SAMPLES && rate < LOW_WATER_MARK {
            warn!(
                source = %source,
                success_rate = rate,
                samples = guard.window.len(),
                "source health below low-water mark"
            );
        }
    }

    /// Reports whether a source should be called at all.
    ///
    /// Optimistic below the minimum sample count; otherwise the success rate
    /// must be at or above the low-water mark. A disabled source is never
    /// healthy.
    pub async fn is_healthy(&self, source: &str) -> bool {
        let state = self.state(source);
        let guard = state.lock().await;
        guard.is_healthy()
    }

    /// Administratively enables or disables a source.
    pub async fn set_enabled(&self, source: &str, enabled: bool) {
        let state = self.state(source);
        let mut guard = state.lock().await;
        guard.enabled = enabled;
    }

    /// Computes the per-call timeout budget for a source.
    ///
    /// Derived from the rolling average latency with headroom, clamped to
    /// `[floor, ceiling]`; doubled while the source is below the low-water
    /// mark (its retries get more room to recover) and reduced to three
    /// quarters while it is fast and reliable.
    pub async fn timeout_for(&self, source: &str, floor: Duration, ceiling: Duration) -> Duration {
        let state = self.state(source);
        let guard = state.lock().await;

        let base = match guard.avg_latency() {
            Some(avg) => (avg * LATENCY_HEADROOM).clamp(floor, ceiling),
            // No history yet: be generous.
            None => ceiling,
        };

        if guard.window.len() < MIN_SAMPLES {
            return base;
        }

        let rate = guard.success_rate();
        if rate < LOW_WATER_MARK {
            return base * 2;
        }
        if rate > HIGH_WATER_MARK
            && guard.avg_latency().is_some_and(|avg| avg < FAST_LATENCY)
        {
            return (base * 3 / 4).max(floor);
        }
        base
    }

    /// Returns a point-in-time snapshot of one source's health.
    pub async fn snapshot(&self, source: &str) -> HealthSnapshot {
        let state = self.state(source);
        let guard = state.lock().await;
        HealthSnapshot {
            samples: guard.window.len(),
            success_rate: guard.success_rate(),
            avg_latency: guard.avg_latency(),
            enabled: guard.enabled,
            healthy: guard.is_healthy(),
        }
    }

    /// Gets or creates the state entry, cloning the Arc so the `DashMap`
    /// shard lock is released before any await on the inner mutex.
    fn state(&self, source: &str) -> Arc<Mutex<SourceHealth>> {
        self.sources
            .entry(source.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(SourceHealth::new())))
            .clone()
    }

    fn remaining_wait(state: &SourceHealth, pacing: Duration) -> Duration {
        let Some(last_call) = state.last_call else {
            return Duration::ZERO;
        };
        let effective = pacing * (1 + state.recent_failures());
        effective.saturating_sub(last_call.elapsed())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const PACING: Duration = Duration::from_secs(1);
    const FLOOR: Duration = Duration::from_secs(2);
    const CEILING: Duration = Duration::from_secs(30);

    // ==================== Pacing Tests ====================

    #[tokio::test]
    async fn test_first_call_never_waits() {
        tokio::time::pause();
        let tracker = HealthTracker::new();
        assert_eq!(tracker.should_wait("openbd", PACING).await, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_pace_delays_second_call() {
        tokio::time::pause();
        let tracker = HealthTracker::new();

        let start = Instant::now();
        tracker.pace("openbd", PACING).await;
        assert!(start.elapsed() < Duration::from_millis(10));

        tracker.pace("openbd", PACING).await;
        assert!(start.elapsed() >= PACING);
    }

    #[tokio::test]
    async fn test_pacing_is_per_source() {
        tokio::time::pause();
        let tracker = HealthTracker::new();

        tracker.pace("openbd", PACING).await;
        let start = Instant::now();
        tracker.pace("google_books", PACING).await;
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_recent_failures_scale_pacing_interval() {
        tokio::time::pause();
        let tracker = HealthTracker::new();

        tracker.pace("loc", PACING).await;
        for _ in 0..3 {
            tracker
                .record_outcome("loc", false, Duration::from_millis(100))
                .await;
        }

        // Effective interval is pacing * (1 + 3 recent failures).
        let wait = tracker.should_wait("loc", PACING).await;
        assert!(wait > PACING * 3, "wait {wait:?} should exceed 3x pacing");
        assert!(wait <= PACING * 4);
    }

    // ==================== Health Tests ====================

    #[tokio::test]
    async fn test_unknown_source_is_healthy() {
        let tracker = HealthTracker::new();
        assert!(tracker.is_healthy("never_called").await);
    }

    #[tokio::test]
    async fn test_optimistic_below_min_samples() {
        let tracker = HealthTracker::new();
        // Four straight failures: still under the sample minimum.
        for _ in 0..MIN_SAMPLES - 1 {
            tracker
                .record_outcome("flaky", false, Duration::from_millis(50))
                .await;
        }
        assert!(tracker.is_healthy("flaky").await);
    }

    #[tokio::test]
    async fn test_unhealthy_below_low_water_mark() {
        let tracker = HealthTracker::new();
        for _ in 0..MIN_SAMPLES {
            tracker
                .record_outcome("flaky", false, Duration::from_millis(50))
                .await;
        }
        assert!(!tracker.is_healthy("flaky").await);

        let snapshot = tracker.snapshot("flaky").await;
        assert_eq!(snapshot.samples, MIN_SAMPLES);
        assert!(snapshot.success_rate < f64::EPSILON);
        assert!(!snapshot.healthy);
    }

    #[tokio::test]
    async fn test_disabled_source_is_unhealthy() {
        let tracker = HealthTracker::new();
        tracker.set_enabled("openbd", false).await;
        assert!(!tracker.is_healthy("openbd").await);
        tracker.set_enabled("openbd", true).await;
        assert!(tracker.is_healthy("openbd").await);
    }

    #[tokio::test]
    async fn test_window_eviction_bounds_samples() {
        let tracker = HealthTracker::new();
        // Fill beyond capacity with failures, then recover with successes.
        for _ in 0..WINDOW_CAP {
            tracker
                .record_outcome("recovering", false, Duration::from_millis(10))
                .await;
        }
        for _ in 0..WINDOW_CAP {
            tracker
                .record_outcome("recovering", true, Duration::from_millis(10))
                .await;
        }
        let snapshot = tracker.snapshot("recovering").await;
        assert_eq!(snapshot.samples, WINDOW_CAP);
        assert!((snapshot.success_rate - 1.0).abs() < f64::EPSILON);
        assert!(snapshot.healthy);
    }

    // ==================== Timeout Budget Tests ====================

    #[tokio::test]
    async fn test_timeout_generous_without_history() {
        let tracker = HealthTracker::new();
        assert_eq!(tracker.timeout_for("fresh", FLOOR, CEILING).await, CEILING);
    }

    #[tokio::test]
    async fn test_timeout_derived_from_latency_with_clamp() {
        let tracker = HealthTracker::new();
        for _ in 0..MIN_SAMPLES {
            tracker
                .record_outcome("mid", true, Duration::from_secs(2))
                .await;
        }
        // avg 2s * headroom 4 = 8s, inside the clamp, then tightened by the
        // high-water rule only when latency is fast - 2s is not fast.
        assert_eq!(
            tracker.timeout_for("mid", FLOOR, CEILING).await,
            Duration::from_secs(8)
        );
    }

    #[tokio::test]
    async fn test_timeout_widens_for_unhealthy_source() {
        let tracker = HealthTracker::new();
        for _ in 0..MIN_SAMPLES {
            tracker
                .record_outcome("sick", false, Duration::from_secs(2))
                .await;
        }
        // Base 8s doubled while below the low-water mark.
        assert_eq!(
            tracker.timeout_for("sick", FLOOR, CEILING).await,
            Duration::from_secs(16)
        );
    }

    #[tokio::test]
    async fn test_timeout_tightens_for_fast_reliable_source() {
        let tracker = HealthTracker::new();
        for _ in 0..MIN_SAMPLES {
            tracker
                .record_outcome("fast", true, Duration::from_millis(600))
                .await;
        }
        // avg 600ms * 4 = 2.4s, tightened to 3/4 = 1.8s, floored at 2s.
        assert_eq!(tracker.timeout_for("fast", FLOOR, CEILING).await, FLOOR);
    }

    #[tokio::test]
    async fn test_timeout_respects_ceiling() {
        let tracker = HealthTracker::new();
        for _ in 0..MIN_SAMPLES {
            tracker
                .record_outcome("slow", true, Duration::from_secs(20))
                .await;
        }
        assert_eq!(tracker.timeout_for("slow", FLOOR, CEILING).await, CEILING);
    }
}
