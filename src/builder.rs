//! Construction of memoized functions.
//!
//! ```
//! use swr_memo::{SwrBuilder, EvictionPolicy};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> swr_memo::Result<()> {
//! let report = SwrBuilder::new(|(team, week): (String, u32)| async move {
//!     Ok::<_, swr_memo::Error>(format!("{} / week {}", team, week))
//! })
//! .ttl(Duration::from_secs(60))
//! .namespace("reports")
//! .max_entries(500)
//! .eviction_policy(EvictionPolicy::LeastRecentlySet)
//! .build()?;
//!
//! assert_eq!(report.call(("core".to_string(), 3)).await?, "core / week 3");
//! # Ok(())
//! # }
//! ```

use crate::backend::{CacheBackend, EvictionPolicy, InMemoryBackend, InMemoryConfig};
use crate::config::SwrConfig;
use crate::engine::SwrEngine;
use crate::error::Result;
use crate::fetcher::Fetcher;
use crate::key::KeyDeriver;
use crate::observability::{NoOpMetrics, SwrMetrics};
use crate::service::SwrService;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::marker::PhantomData;
use std::time::Duration;

/// Refresh interval used when the builder is not given one.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5);

/// Builder for [`SwrService`].
///
/// Starts out with a bounded [`InMemoryBackend`], canonical JSON keys, no
/// metrics and a [`DEFAULT_TTL`] refresh interval.
pub struct SwrBuilder<A, R, F, B = InMemoryBackend> {
    fetcher: F,
    backend: B,
    memory: InMemoryConfig,
    config: SwrConfig,
    key_deriver: KeyDeriver<A>,
    metrics: Box<dyn SwrMetrics>,
    _values: PhantomData<fn(A) -> R>,
}

impl<A, R, F> SwrBuilder<A, R, F, InMemoryBackend>
where
    F: Fetcher<A, R>,
{
    pub fn new(fetcher: F) -> Self {
        let memory = InMemoryConfig::default();
        SwrBuilder {
            fetcher,
            backend: InMemoryBackend::with_config(memory.clone()),
            memory,
            config: SwrConfig::new(DEFAULT_TTL),
            key_deriver: KeyDeriver::canonical(),
            metrics: Box::new(NoOpMetrics),
            _values: PhantomData,
        }
    }

    /// Bound the in-memory store. `0` is treated as unbounded.
    pub fn max_entries(mut self, max_entries: usize) -> Self {
        self.memory.max_entries = (max_entries > 0).then_some(max_entries);
        self.backend = InMemoryBackend::with_config(self.memory.clone());
        self
    }

    /// Let the in-memory store grow without limit.
    pub fn unbounded(mut self) -> Self {
        self.memory.max_entries = None;
        self.backend = InMemoryBackend::with_config(self.memory.clone());
        self
    }

    pub fn eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.memory.eviction = policy;
        self.backend = InMemoryBackend::with_config(self.memory.clone());
        self
    }
}

impl<A, R, F, B> SwrBuilder<A, R, F, B> {
    /// Refresh interval.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.config.ttl = ttl;
        self
    }

    /// TTL handed to the store; defaults to twice the refresh interval.
    pub fn store_ttl(mut self, store_ttl: Duration) -> Self {
        self.config.store_ttl = Some(store_ttl);
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = Some(namespace.into());
        self
    }

    /// Share one fetch between concurrent cold callers of the same key.
    pub fn single_flight(mut self, enabled: bool) -> Self {
        self.config.single_flight = enabled;
        self
    }

    /// Replace the whole configuration, e.g. with [`SwrConfig::from_env`].
    pub fn config(mut self, config: SwrConfig) -> Self {
        self.config = config;
        self
    }

    /// Derive keys with `f` instead of canonical JSON.
    pub fn key_deriver<K>(mut self, f: K) -> Self
    where
        K: Fn(&A) -> String + Send + Sync + 'static,
    {
        self.key_deriver = KeyDeriver::custom(f);
        self
    }

    pub fn metrics(mut self, metrics: Box<dyn SwrMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Use `backend` as the store.
    pub fn backend<B2: CacheBackend>(self, backend: B2) -> SwrBuilder<A, R, F, B2> {
        SwrBuilder {
            fetcher: self.fetcher,
            backend,
            memory: self.memory,
            config: self.config,
            key_deriver: self.key_deriver,
            metrics: self.metrics,
            _values: PhantomData,
        }
    }

    /// Create the store with an async constructor.
    ///
    /// ```ignore
    /// let memo = SwrBuilder::new(fetcher)
    ///     .backend_factory(|| RedisBackend::new(RedisConfig::default()))
    ///     .await?
    ///     .build()?;
    /// ```
    ///
    /// # Errors
    ///
    /// Returns whatever error the factory returns.
    pub async fn backend_factory<B2, G, Fut>(self, factory: G) -> Result<SwrBuilder<A, R, F, B2>>
    where
        B2: CacheBackend,
        G: FnOnce() -> Fut,
        Fut: Future<Output = Result<B2>>,
    {
        let backend = factory().await?;
        Ok(self.backend(backend))
    }
}

impl<A, R, F, B> SwrBuilder<A, R, F, B>
where
    A: Serialize + Clone + Send + Sync + 'static,
    R: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    F: Fetcher<A, R> + 'static,
    B: CacheBackend + 'static,
{
    /// Assemble the memoized function.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigError` if the configuration does not validate.
    pub fn build(self) -> Result<SwrService<A, R, F, B>> {
        let engine = SwrEngine::from_parts(
            self.fetcher,
            self.backend,
            self.config,
            self.key_deriver,
            self.metrics,
        )?;
        Ok(SwrService::from_engine(engine))
    }
}

/// Memoize `fetcher` with a refresh interval of `ttl` and default settings.
///
/// ```
/// use swr_memo::create_swr;
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> swr_memo::Result<()> {
/// let double = create_swr(
///     |n: u64| async move { Ok::<_, swr_memo::Error>(n * 2) },
///     Duration::from_millis(500),
/// )?;
/// assert_eq!(double.call(21).await?, 42);
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns `Error::ConfigError` for a zero `ttl`.
pub fn create_swr<A, R, F>(fetcher: F, ttl: Duration) -> Result<SwrService<A, R, F>>
where
    A: Serialize + Clone + Send + Sync + 'static,
    R: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    F: Fetcher<A, R> + 'static,
{
    SwrBuilder::new(fetcher).ttl(ttl).build()
}
