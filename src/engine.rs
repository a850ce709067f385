//! SWR engine - the decision procedure for one memoized call.
//!
//! ```text
//! call(args)
//!   key  = derive(args)                       error -> returned to caller
//!   read = store.get(key) + decode            error -> logged, treated as absent
//!
//!   absent                      -> fetch, set, arm timer         Miss
//!   present, timer live         -> return cached                 Hit
//!   present, no timer           -> start refresh now, return     Stale
//! ```
//!
//! Background refreshes never surface errors to callers: a failed refresh is
//! logged, reported to metrics, and the previous value is written back so it
//! outlives the next cycle too.

use crate::backend::CacheBackend;
use crate::config::SwrConfig;
use crate::error::{Error, Result};
use crate::fetcher::Fetcher;
use crate::key::{CacheKeyBuilder, KeyDeriver};
use crate::observability::{NoOpMetrics, SwrMetrics};
use crate::scheduler::{RefreshJob, RefreshScheduler};
use crate::serialization::{decode_value, encode_value};
use crate::state::{CallOutcome, RefreshState};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Value returned by a call together with how it was served.
#[derive(Clone, Debug, PartialEq)]
pub struct SwrResponse<R> {
    pub value: R,
    pub outcome: CallOutcome,
}

impl<R> SwrResponse<R> {
    pub fn into_value(self) -> R {
        self.value
    }
}

type PendingFetch<R> = Shared<BoxFuture<'static, Result<R>>>;

/// A cold fetch other callers can join. Held weakly, so the fetch is
/// dropped as soon as every caller awaiting it has gone away.
struct Flight<R> {
    id: u64,
    fetch: WeakShared<BoxFuture<'static, Result<R>>>,
}

/// Everything a background refresh needs. Refresh tasks hold it weakly.
struct EngineInner<A, R, F, B> {
    backend: B,
    fetcher: F,
    key_deriver: KeyDeriver<A>,
    config: SwrConfig,
    metrics: Box<dyn SwrMetrics>,
    _values: PhantomData<fn(A) -> R>,
}

impl<A, R, F, B> EngineInner<A, R, F, B>
where
    A: Send,
    R: Serialize + DeserializeOwned + Send,
    F: Fetcher<A, R>,
    B: CacheBackend,
{
    /// Read and decode. Store and codec failures degrade to absent.
    async fn read(&self, key: &str) -> Option<R> {
        let bytes = match self.backend.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!("⚠ Store GET failed for {}: {} (treating as miss)", key, e);
                self.metrics.record_store_error(key, &e.to_string());
                return None;
            }
        };

        match decode_value::<R>(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("⚠ Unreadable cache entry for {}: {} (treating as miss)", key, e);
                self.metrics.record_store_error(key, &e.to_string());
                None
            }
        }
    }

    /// Encode and write. Returns whether the store accepted the value.
    async fn write(&self, key: &str, value: &R) -> bool {
        let bytes = match encode_value(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("⚠ Could not encode value for {}: {}", key, e);
                self.metrics.record_store_error(key, &e.to_string());
                return false;
            }
        };

        let ttl = self.config.effective_store_ttl();
        match self.backend.set(key, bytes, Some(ttl)).await {
            Ok(()) => true,
            Err(e) => {
                warn!("⚠ Store SET failed for {}: {}", key, e);
                self.metrics.record_store_error(key, &e.to_string());
                false
            }
        }
    }

    async fn fetch_and_store(&self, key: &str, args: A) -> Result<R> {
        let value = self.fetcher.fetch(args).await?;
        self.write(key, &value).await;
        Ok(value)
    }

    async fn refresh(&self, key: &str, args: A) {
        let timer = Instant::now();
        debug!("» Background refresh for {}", key);

        match self.fetcher.fetch(args).await {
            Ok(value) => {
                if self.write(key, &value).await {
                    debug!("✓ Refreshed {} in {:?}", key, timer.elapsed());
                    self.metrics.record_refresh(key, timer.elapsed());
                }
            }
            Err(e) => {
                warn!(
                    "⚠ Background refresh failed for {}: {} (keeping previous value)",
                    key, e
                );
                self.metrics.record_refresh_error(key, &e.to_string());

                // Carry the previous value into the next cycle
                if let Some(previous) = self.read(key).await {
                    self.write(key, &previous).await;
                }
            }
        }
    }
}

/// Removes a single-flight entry once its fetch finishes or is abandoned.
struct PendingGuard<R> {
    pending: Arc<DashMap<String, Flight<R>>>,
    key: String,
    id: u64,
}

impl<R> Drop for PendingGuard<R> {
    fn drop(&mut self) {
        let id = self.id;
        self.pending.remove_if(&self.key, |_, flight| flight.id == id);
    }
}

/// Core SWR engine.
///
/// Owns its refresh scheduler; dropping the engine stops every background
/// refresh it started. Most applications hold a [`SwrService`](crate::SwrService)
/// instead, which is a cloneable handle over one engine.
pub struct SwrEngine<A, R, F, B> {
    inner: Arc<EngineInner<A, R, F, B>>,
    scheduler: RefreshScheduler,
    pending: Arc<DashMap<String, Flight<R>>>,
    next_flight: AtomicU64,
}

impl<A, R, F, B> SwrEngine<A, R, F, B>
where
    A: Serialize + Clone + Send + Sync + 'static,
    R: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    F: Fetcher<A, R> + 'static,
    B: CacheBackend + 'static,
{
    /// Create an engine with canonical keys and no metrics.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigError` if `config` does not validate.
    pub fn new(fetcher: F, backend: B, config: SwrConfig) -> Result<Self> {
        Self::from_parts(
            fetcher,
            backend,
            config,
            KeyDeriver::canonical(),
            Box::new(NoOpMetrics),
        )
    }

    pub(crate) fn from_parts(
        fetcher: F,
        backend: B,
        config: SwrConfig,
        key_deriver: KeyDeriver<A>,
        metrics: Box<dyn SwrMetrics>,
    ) -> Result<Self> {
        config.validate()?;

        info!(
            "✓ SWR engine initialized (ttl {:?}, store ttl {:?}, single-flight {})",
            config.ttl,
            config.effective_store_ttl(),
            config.single_flight
        );

        Ok(SwrEngine {
            inner: Arc::new(EngineInner {
                backend,
                fetcher,
                key_deriver,
                config,
                metrics,
                _values: PhantomData,
            }),
            scheduler: RefreshScheduler::new(),
            pending: Arc::new(DashMap::new()),
            next_flight: AtomicU64::new(1),
        })
    }

    /// Memoized call.
    ///
    /// # Errors
    ///
    /// - `Error::KeyDerivationError`: `args` cannot be keyed; nothing was fetched
    /// - any error from the fetcher, on a cold miss
    /// - `Error::Shutdown`: cold miss after [`shutdown`](Self::shutdown)
    pub async fn call(&self, args: A) -> Result<R> {
        self.call_detailed(args).await.map(SwrResponse::into_value)
    }

    /// Memoized call that also reports whether it was a hit, stale read, or miss.
    ///
    /// # Errors
    ///
    /// Same as [`call`](Self::call).
    pub async fn call_detailed(&self, args: A) -> Result<SwrResponse<R>> {
        let timer = Instant::now();
        let key = self.cache_key(&args)?;
        debug!("» SWR call for key: {}", key);

        if let Some(value) = self.inner.read(&key).await {
            let outcome = self.on_cached(&key, args);
            match outcome {
                CallOutcome::Stale => self.inner.metrics.record_stale(&key, timer.elapsed()),
                _ => self.inner.metrics.record_hit(&key, timer.elapsed()),
            }
            debug!("✓ {} for {} in {:?}", outcome, key, timer.elapsed());
            return Ok(SwrResponse { value, outcome });
        }

        let value = self.cold_path(&key, args).await?;
        self.inner.metrics.record_miss(&key, timer.elapsed());
        debug!("✓ Miss for {} filled in {:?}", key, timer.elapsed());

        Ok(SwrResponse {
            value,
            outcome: CallOutcome::Miss,
        })
    }

    /// Refresh state of the key `args` maps to.
    ///
    /// # Errors
    ///
    /// Returns `Error::KeyDerivationError` if `args` cannot be keyed.
    pub fn refresh_state(&self, args: &A) -> Result<RefreshState> {
        let key = self.cache_key(args)?;
        Ok(self.scheduler.state(&key))
    }

    /// Number of keys with a live refresh timer.
    pub fn active_refreshes(&self) -> usize {
        self.scheduler.len()
    }

    /// Stop all background refreshes. Cached values are still served, but
    /// the fetcher is never invoked again.
    ///
    /// Returns the number of refresh timers cancelled.
    pub fn shutdown(&self) -> usize {
        let cancelled = self.scheduler.shutdown();
        info!("SWR engine shut down ({} refresh timers cancelled)", cancelled);
        cancelled
    }

    pub fn is_shut_down(&self) -> bool {
        self.scheduler.is_shut_down()
    }

    /// Get backend reference (for advanced use).
    pub fn backend(&self) -> &B {
        &self.inner.backend
    }

    pub fn config(&self) -> &SwrConfig {
        &self.inner.config
    }

    fn cache_key(&self, args: &A) -> Result<String> {
        let key = self.inner.key_deriver.derive(args)?;
        Ok(match &self.inner.config.namespace {
            Some(namespace) => CacheKeyBuilder::build_with_prefix(namespace, &key),
            None => key,
        })
    }

    fn on_cached(&self, key: &str, args: A) -> CallOutcome {
        if self.scheduler.is_active(key) {
            return CallOutcome::Hit;
        }

        if self.scheduler.ensure_refresh(key, self.refresh_job(key, args)) {
            CallOutcome::Stale
        } else {
            // Lost the race to another reader, or shut down
            CallOutcome::Hit
        }
    }

    async fn cold_path(&self, key: &str, args: A) -> Result<R> {
        if self.is_shut_down() {
            return Err(Error::Shutdown);
        }

        let job = self.refresh_job(key, args.clone());

        if self.inner.config.single_flight {
            let value = self.single_flight(key, args).await?;
            // Whoever finishes first arms; the rest find the timer live
            self.scheduler.arm_if_idle(key, self.inner.config.ttl, job);
            return Ok(value);
        }

        let value = self.inner.fetch_and_store(key, args).await?;
        self.scheduler.arm(key, self.inner.config.ttl, job);
        Ok(value)
    }

    /// Join an in-flight cold fetch for `key`, or start one.
    async fn single_flight(&self, key: &str, args: A) -> Result<R> {
        let fetch = match self.pending.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => match occupied.get().fetch.upgrade() {
                Some(fetch) => {
                    debug!("» Joining in-flight fetch for {}", key);
                    fetch
                }
                None => {
                    let (fetch, flight) = self.start_flight(key, args);
                    match flight {
                        Some(flight) => {
                            occupied.insert(flight);
                        }
                        None => {
                            occupied.remove();
                        }
                    }
                    fetch
                }
            },
            Entry::Vacant(vacant) => {
                let (fetch, flight) = self.start_flight(key, args);
                if let Some(flight) = flight {
                    vacant.insert(flight);
                }
                fetch
            }
        };

        fetch.await
    }

    fn start_flight(&self, key: &str, args: A) -> (PendingFetch<R>, Option<Flight<R>>) {
        let id = self.next_flight.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);
        let guard = PendingGuard {
            pending: Arc::clone(&self.pending),
            key: key.to_string(),
            id,
        };

        let fetch = async move { inner.fetch_and_store(&guard.key, args).await }
            .boxed()
            .shared();
        let flight = fetch.downgrade().map(|fetch| Flight { id, fetch });

        (fetch, flight)
    }

    fn refresh_job(&self, key: &str, args: A) -> RefreshJob {
        let inner = Arc::downgrade(&self.inner);
        let key = key.to_string();

        Arc::new(move || {
            let inner = inner.clone();
            let key = key.clone();
            let args = args.clone();
            async move {
                let inner = inner.upgrade()?;
                inner.refresh(&key, args).await;
                Some(inner.config.ttl)
            }
            .boxed()
        })
    }
}

impl<A, R, F, B> Drop for SwrEngine<A, R, F, B> {
    fn drop(&mut self) {
        debug!(
            "SWR engine dropped with {} active refresh timers",
            self.scheduler.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn counting_fetcher(
        calls: Arc<AtomicU32>,
    ) -> impl Fn(u32) -> BoxFuture<'static, Result<String>> + Send + Sync {
        move |id: u32| {
            let calls = Arc::clone(&calls);
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(format!("data:{}:v{}", id, n))
            }
            .boxed()
        }
    }

    fn engine(
        calls: Arc<AtomicU32>,
        config: SwrConfig,
    ) -> SwrEngine<u32, String, impl Fetcher<u32, String>, InMemoryBackend> {
        SwrEngine::new(counting_fetcher(calls), InMemoryBackend::new(), config)
            .expect("Failed to create engine")
    }

    #[tokio::test(start_paused = true)]
    async fn test_cold_then_hit() {
        let calls = Arc::new(AtomicU32::new(0));
        let engine = engine(Arc::clone(&calls), SwrConfig::new(Duration::from_secs(1)));

        let first = engine.call_detailed(1).await.expect("Failed to call");
        assert_eq!(first.value, "data:1:v1");
        assert_eq!(first.outcome, CallOutcome::Miss);
        assert_eq!(engine.refresh_state(&1).expect("key"), RefreshState::Scheduled);

        let second = engine.call_detailed(1).await.expect("Failed to call");
        assert_eq!(second.value, "data:1:v1");
        assert_eq!(second.outcome, CallOutcome::Hit);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_value_without_timer_is_stale() {
        let calls = Arc::new(AtomicU32::new(0));
        let engine = engine(Arc::clone(&calls), SwrConfig::new(Duration::from_secs(1)));

        let key = engine.cache_key(&7).expect("key");
        let bytes = encode_value(&"seeded".to_string()).expect("Failed to encode");
        engine
            .backend()
            .set(&key, bytes, None)
            .await
            .expect("Failed to seed");

        let response = engine.call_detailed(7).await.expect("Failed to call");
        assert_eq!(response.value, "seeded");
        assert_eq!(response.outcome, CallOutcome::Stale);

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.call(7).await.expect("Failed to call"), "data:7:v1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_namespace_prefixes_keys() {
        let calls = Arc::new(AtomicU32::new(0));
        let engine = engine(
            calls,
            SwrConfig::new(Duration::from_secs(1)).with_namespace("users"),
        );

        engine.call(3).await.expect("Failed to call");
        assert!(engine
            .backend()
            .exists("users:3")
            .await
            .expect("Failed to check"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_refuses_cold_fetch() {
        let calls = Arc::new(AtomicU32::new(0));
        let engine = engine(Arc::clone(&calls), SwrConfig::new(Duration::from_secs(1)));

        engine.call(1).await.expect("Failed to call");
        assert_eq!(engine.shutdown(), 1);
        assert!(engine.is_shut_down());

        // Cached values are still served
        assert_eq!(engine.call(1).await.expect("Failed to call"), "data:1:v1");
        assert!(matches!(engine.call(2).await, Err(Error::Shutdown)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_flight_clears_pending_entry() {
        let calls = Arc::new(AtomicU32::new(0));
        let engine = engine(
            Arc::clone(&calls),
            SwrConfig::new(Duration::from_secs(1)).with_single_flight(true),
        );

        engine.call(1).await.expect("Failed to call");
        assert!(engine.pending.is_empty());
        assert_eq!(engine.active_refreshes(), 1);
    }

    fn slow_engine(
        calls: Arc<AtomicU32>,
    ) -> SwrEngine<u32, String, impl Fetcher<u32, String>, InMemoryBackend> {
        let fetcher = move |id: u32| {
            let calls = Arc::clone(&calls);
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok::<_, Error>(format!("data:{}:v{}", id, n))
            }
            .boxed()
        };
        let config = SwrConfig::new(Duration::from_secs(1)).with_single_flight(true);
        SwrEngine::new(fetcher, InMemoryBackend::new(), config).expect("Failed to create engine")
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_flight_abandoned_fetch_is_cleared() {
        let calls = Arc::new(AtomicU32::new(0));
        let engine = slow_engine(Arc::clone(&calls));

        let abandoned = tokio::time::timeout(Duration::from_millis(100), engine.call(1)).await;
        assert!(abandoned.is_err());
        assert!(engine.pending.is_empty());
        assert_eq!(engine.active_refreshes(), 0);

        // Next caller starts a fresh fetch instead of joining the dead one
        assert_eq!(engine.call(1).await.expect("Failed to call"), "data:1:v2");
        assert!(engine.pending.is_empty());
        assert_eq!(engine.active_refreshes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_flight_follower_arms_when_first_caller_gives_up() {
        let calls = Arc::new(AtomicU32::new(0));
        let engine = slow_engine(Arc::clone(&calls));

        let first = tokio::time::timeout(Duration::from_millis(100), engine.call(1));
        let second = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            engine.call(1).await
        };
        let (first, second) = tokio::join!(first, second);

        assert!(first.is_err());
        assert_eq!(second.expect("Failed to call"), "data:1:v1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.refresh_state(&1).expect("key"), RefreshState::Scheduled);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = SwrEngine::<u32, String, _, _>::new(
            counting_fetcher(calls),
            InMemoryBackend::new(),
            SwrConfig::new(Duration::ZERO),
        );
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }
}
