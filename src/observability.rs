//! Metrics hooks for SWR cache behavior.
//!
//! Implement [`SwrMetrics`] to forward cache events to a monitoring system:
//!
//! ```ignore
//! use swr_memo::observability::SwrMetrics;
//! use std::time::Duration;
//!
//! struct PrometheusMetrics;
//!
//! impl SwrMetrics for PrometheusMetrics {
//!     fn record_hit(&self, _key: &str, _duration: Duration) {
//!         // counter!("swr_hits").inc();
//!     }
//!     // ... implement other methods
//! }
//!
//! // let memo = SwrBuilder::new(fetcher)
//! //     .ttl(Duration::from_secs(30))
//! //     .metrics(Box::new(PrometheusMetrics))
//! //     .build()?;
//! ```
//!
//! The engine uses [`NoOpMetrics`] unless told otherwise. [`LogMetrics`]
//! keeps the default method bodies, which log through the `log` crate.
//!
//! | Hook | Fired when |
//! |------|-----------|
//! | `record_hit` | value served, refresh already scheduled |
//! | `record_stale` | value served, background refresh started by the call |
//! | `record_miss` | cold fetch completed for the caller |
//! | `record_refresh` | background refresh stored a new value |
//! | `record_refresh_error` | background refresh failed (absorbed) |
//! | `record_store_error` | store `get`/`set` or value decoding failed (absorbed) |

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Trait for SWR metrics collection.
pub trait SwrMetrics: Send + Sync {
    /// Record a warm hit.
    fn record_hit(&self, key: &str, duration: Duration) {
        debug!("SWR HIT: {} took {:?}", key, duration);
    }

    /// Record a stale read that triggered a background refresh.
    fn record_stale(&self, key: &str, duration: Duration) {
        debug!("SWR STALE: {} took {:?}", key, duration);
    }

    /// Record a cold miss served by a direct fetch.
    fn record_miss(&self, key: &str, duration: Duration) {
        debug!("SWR MISS: {} took {:?}", key, duration);
    }

    /// Record a completed background refresh.
    fn record_refresh(&self, key: &str, duration: Duration) {
        debug!("SWR REFRESH: {} took {:?}", key, duration);
    }

    /// Record a failed background refresh.
    fn record_refresh_error(&self, key: &str, error: &str) {
        warn!("SWR REFRESH ERROR for {}: {}", key, error);
    }

    /// Record a store or codec failure.
    fn record_store_error(&self, key: &str, error: &str) {
        warn!("SWR STORE ERROR for {}: {}", key, error);
    }
}

/// Default metrics implementation (no-op).
#[derive(Clone, Default)]
pub struct NoOpMetrics;

impl SwrMetrics for NoOpMetrics {
    fn record_hit(&self, _key: &str, _duration: Duration) {}
    fn record_stale(&self, _key: &str, _duration: Duration) {}
    fn record_miss(&self, _key: &str, _duration: Duration) {}
    fn record_refresh(&self, _key: &str, _duration: Duration) {}
    fn record_refresh_error(&self, _key: &str, _error: &str) {}
    fn record_store_error(&self, _key: &str, _error: &str) {}
}

/// Metrics that only log.
#[derive(Clone, Default)]
pub struct LogMetrics;

impl SwrMetrics for LogMetrics {}

/// Point-in-time copy of [`CounterMetrics`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub stale: u64,
    pub misses: u64,
    pub refreshes: u64,
    pub refresh_errors: u64,
    pub store_errors: u64,
}

/// In-process counters, one per hook.
///
/// Share it with the engine through an `Arc`:
///
/// ```
/// use swr_memo::observability::CounterMetrics;
/// use std::sync::Arc;
///
/// let counters = Arc::new(CounterMetrics::default());
/// let for_engine: Box<dyn swr_memo::observability::SwrMetrics> = Box::new(Arc::clone(&counters));
/// assert_eq!(counters.snapshot().hits, 0);
/// # drop(for_engine);
/// ```
#[derive(Default)]
pub struct CounterMetrics {
    hits: AtomicU64,
    stale: AtomicU64,
    misses: AtomicU64,
    refreshes: AtomicU64,
    refresh_errors: AtomicU64,
    store_errors: AtomicU64,
}

impl CounterMetrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            refresh_errors: self.refresh_errors.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
        }
    }
}

impl SwrMetrics for CounterMetrics {
    fn record_hit(&self, _key: &str, _duration: Duration) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_stale(&self, _key: &str, _duration: Duration) {
        self.stale.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self, _key: &str, _duration: Duration) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_refresh(&self, _key: &str, _duration: Duration) {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
    }

    fn record_refresh_error(&self, key: &str, error: &str) {
        self.refresh_errors.fetch_add(1, Ordering::Relaxed);
        warn!("SWR REFRESH ERROR for {}: {}", key, error);
    }

    fn record_store_error(&self, key: &str, error: &str) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
        warn!("SWR STORE ERROR for {}: {}", key, error);
    }
}

impl<M: SwrMetrics + ?Sized> SwrMetrics for std::sync::Arc<M> {
    fn record_hit(&self, key: &str, duration: Duration) {
        (**self).record_hit(key, duration)
    }

    fn record_stale(&self, key: &str, duration: Duration) {
        (**self).record_stale(key, duration)
    }

    fn record_miss(&self, key: &str, duration: Duration) {
        (**self).record_miss(key, duration)
    }

    fn record_refresh(&self, key: &str, duration: Duration) {
        (**self).record_refresh(key, duration)
    }

    fn record_refresh_error(&self, key: &str, error: &str) {
        (**self).record_refresh_error(key, error)
    }

    fn record_store_error(&self, key: &str, error: &str) {
        (**self).record_store_error(key, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_noop_metrics() {
        let metrics = NoOpMetrics;
        metrics.record_hit("key", Duration::from_secs(1));
        metrics.record_refresh_error("key", "boom");
    }

    #[test]
    fn test_counter_metrics_snapshot() {
        let metrics = CounterMetrics::default();
        metrics.record_hit("a", Duration::ZERO);
        metrics.record_hit("a", Duration::ZERO);
        metrics.record_miss("b", Duration::ZERO);
        metrics.record_refresh_error("b", "upstream down");

        assert_eq!(
            metrics.snapshot(),
            MetricsSnapshot {
                hits: 2,
                misses: 1,
                refresh_errors: 1,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_arc_forwards_to_inner() {
        let counters = Arc::new(CounterMetrics::default());
        let boxed: Box<dyn SwrMetrics> = Box::new(Arc::clone(&counters));

        boxed.record_stale("k", Duration::ZERO);
        boxed.record_store_error("k", "set failed");

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.stale, 1);
        assert_eq!(snapshot.store_errors, 1);
    }
}
