//! In-memory cache backend (default, thread-safe, async).
//!
//! Uses DashMap for lock-free concurrent access with per-key sharding.
//! TTL expiration is checked on access. An optional entry bound keeps the
//! map from growing without limit when many distinct argument tuples occur.

use super::CacheBackend;
use crate::error::Result;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Default entry bound, matching a 100-entry memory cache.
pub const DEFAULT_MAX_ENTRIES: usize = 100;

/// Which entry to drop when the backend is over capacity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// Drop the entry whose last `set` is oldest.
    LeastRecentlySet,
    /// Drop the entry whose last `get` hit or `set` is oldest.
    #[default]
    LeastRecentlyUsed,
}

/// Configuration for the in-memory backend.
#[derive(Clone, Debug)]
pub struct InMemoryConfig {
    /// Maximum number of live entries. None = unbounded.
    pub max_entries: Option<usize>,
    pub eviction: EvictionPolicy,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        InMemoryConfig {
            max_entries: Some(DEFAULT_MAX_ENTRIES),
            eviction: EvictionPolicy::default(),
        }
    }
}

/// In-memory cache entry with optional expiration.
struct CacheEntry {
    data: Vec<u8>,
    expires_at: Option<Instant>,
    touched: AtomicU64,
}

impl CacheEntry {
    fn new(data: Vec<u8>, ttl: Option<Duration>, tick: u64) -> Self {
        let expires_at = ttl.map(|d| Instant::now() + d);
        CacheEntry {
            data,
            expires_at,
            touched: AtomicU64::new(tick),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Instant::now() > exp)
    }
}

/// Thread-safe async in-memory cache backend.
///
/// Expiry uses the tokio clock, so paused-time tests observe TTLs exactly.
///
/// # Example
///
/// ```no_run
/// use swr_memo::backend::{CacheBackend, EvictionPolicy, InMemoryBackend};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let backend = InMemoryBackend::bounded(1_000, EvictionPolicy::LeastRecentlyUsed);
///
///     backend.set("key1", b"value".to_vec(), None).await?;
///     assert!(backend.get("key1").await?.is_some());
///
///     backend.set("key2", b"expires".to_vec(), Some(Duration::from_secs(300))).await?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct InMemoryBackend {
    store: Arc<DashMap<String, CacheEntry>>,
    clock: Arc<AtomicU64>,
    max_entries: Option<usize>,
    eviction: EvictionPolicy,
}

impl InMemoryBackend {
    /// Create an unbounded in-memory cache backend.
    pub fn new() -> Self {
        Self::with_config(InMemoryConfig {
            max_entries: None,
            eviction: EvictionPolicy::default(),
        })
    }

    /// Create a backend holding at most `max_entries` live entries.
    pub fn bounded(max_entries: usize, eviction: EvictionPolicy) -> Self {
        Self::with_config(InMemoryConfig {
            max_entries: Some(max_entries),
            eviction,
        })
    }

    pub fn with_config(config: InMemoryConfig) -> Self {
        InMemoryBackend {
            store: Arc::new(DashMap::new()),
            clock: Arc::new(AtomicU64::new(0)),
            max_entries: config.max_entries,
            eviction: config.eviction,
        }
    }

    /// Get the current number of entries in cache (including expired ones
    /// not yet purged).
    pub async fn len(&self) -> usize {
        self.store.len()
    }

    /// Check if cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Drop every entry.
    pub async fn clear(&self) {
        self.store.clear();
        warn!("⚠ InMemory CLEAR executed - all cache cleared!");
    }

    /// Get memory statistics.
    pub async fn stats(&self) -> CacheStats {
        let total_bytes: usize = self.store.iter().map(|entry| entry.data.len()).sum();
        let expired_count = self.store.iter().filter(|entry| entry.is_expired()).count();

        CacheStats {
            total_entries: self.store.len(),
            expired_entries: expired_count,
            total_bytes,
            max_entries: self.max_entries,
        }
    }

    /// Print cache statistics to debug log.
    pub async fn log_stats(&self) {
        let stats = self.stats().await;
        debug!(
            "Cache Stats: {} entries ({} expired), {} bytes, bound {:?}",
            stats.total_entries, stats.expired_entries, stats.total_bytes, stats.max_entries
        );
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Bring the map back under `max_entries`: purge expired entries first,
    /// then drop the oldest by the configured policy.
    fn enforce_capacity(&self) {
        let Some(max) = self.max_entries else {
            return;
        };

        if self.store.len() <= max {
            return;
        }

        self.store.retain(|_, entry| !entry.is_expired());

        while self.store.len() > max {
            let oldest = self
                .store
                .iter()
                .min_by_key(|entry| entry.touched.load(Ordering::Relaxed))
                .map(|entry| entry.key().clone());

            match oldest {
                Some(key) => {
                    self.store.remove(&key);
                    debug!("✓ InMemory EVICT {} ({:?})", key, self.eviction);
                }
                None => break,
            }
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::with_config(InMemoryConfig::default())
    }
}

impl CacheBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if let Some(entry) = self.store.get(key) {
            if !entry.is_expired() {
                if self.eviction == EvictionPolicy::LeastRecentlyUsed {
                    entry.touched.store(self.tick(), Ordering::Relaxed);
                }
                debug!("✓ InMemory GET {} -> HIT", key);
                return Ok(Some(entry.data.clone()));
            }
        }

        // The shard guard above is released before removing
        self.store.remove_if(key, |_, entry| entry.is_expired());
        debug!("✓ InMemory GET {} -> MISS", key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let entry = CacheEntry::new(value, ttl, self.tick());
        self.store.insert(key.to_string(), entry);

        if let Some(d) = ttl {
            debug!("✓ InMemory SET {} (TTL: {:?})", key, d);
        } else {
            debug!("✓ InMemory SET {}", key);
        }

        self.enforce_capacity();
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        if let Some(entry) = self.store.get(key) {
            return Ok(!entry.is_expired());
        }

        Ok(false)
    }
}

/// Cache statistics.
#[derive(Clone, Debug)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub total_bytes: usize,
    pub max_entries: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_inmemory_backend_set_get() {
        let backend = InMemoryBackend::new();

        backend
            .set("key1", b"value1".to_vec(), None)
            .await
            .expect("Failed to set");

        let result = backend.get("key1").await.expect("Failed to get");
        assert_eq!(result, Some(b"value1".to_vec()));
    }

    #[tokio::test]
    async fn test_inmemory_backend_miss() {
        let backend = InMemoryBackend::new();

        let result = backend.get("nonexistent").await.expect("Failed to get");
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_inmemory_backend_overwrite() {
        let backend = InMemoryBackend::new();

        backend.set("key", b"v1".to_vec(), None).await.unwrap();
        backend.set("key", b"v2".to_vec(), None).await.unwrap();

        assert_eq!(backend.get("key").await.unwrap(), Some(b"v2".to_vec()));
        assert_eq!(backend.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inmemory_backend_ttl_expiration() {
        let backend = InMemoryBackend::new();

        backend
            .set("key1", b"value1".to_vec(), Some(Duration::from_millis(100)))
            .await
            .expect("Failed to set");

        assert!(backend.get("key1").await.expect("Failed to get").is_some());

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(backend.get("key1").await.expect("Failed to get").is_none());
        assert!(!backend.exists("key1").await.expect("Failed to check"));
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_least_recently_set_eviction() {
        let backend = InMemoryBackend::bounded(2, EvictionPolicy::LeastRecentlySet);

        backend.set("a", b"1".to_vec(), None).await.unwrap();
        backend.set("b", b"2".to_vec(), None).await.unwrap();
        // Reading `a` does not protect it under this policy
        assert!(backend.get("a").await.unwrap().is_some());
        backend.set("c", b"3".to_vec(), None).await.unwrap();

        assert_eq!(backend.len().await, 2);
        assert!(backend.get("a").await.unwrap().is_none());
        assert!(backend.get("b").await.unwrap().is_some());
        assert!(backend.get("c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_least_recently_used_eviction() {
        let backend = InMemoryBackend::bounded(2, EvictionPolicy::LeastRecentlyUsed);

        backend.set("a", b"1".to_vec(), None).await.unwrap();
        backend.set("b", b"2".to_vec(), None).await.unwrap();
        assert!(backend.get("a").await.unwrap().is_some());
        backend.set("c", b"3".to_vec(), None).await.unwrap();

        assert_eq!(backend.len().await, 2);
        assert!(backend.get("a").await.unwrap().is_some());
        assert!(backend.get("b").await.unwrap().is_none());
        assert!(backend.get("c").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_purged_before_live_ones() {
        let backend = InMemoryBackend::bounded(2, EvictionPolicy::LeastRecentlySet);

        backend.set("live", b"1".to_vec(), None).await.unwrap();
        backend
            .set("short", b"2".to_vec(), Some(Duration::from_millis(10)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        backend.set("new", b"3".to_vec(), None).await.unwrap();

        assert!(backend.get("live").await.unwrap().is_some());
        assert!(backend.get("new").await.unwrap().is_some());
        assert_eq!(backend.len().await, 2);
    }

    #[tokio::test]
    async fn test_default_backend_is_bounded() {
        let backend = InMemoryBackend::default();
        for i in 0..(DEFAULT_MAX_ENTRIES + 10) {
            backend
                .set(&format!("key_{}", i), vec![0u8], None)
                .await
                .unwrap();
        }

        let stats = backend.stats().await;
        assert_eq!(stats.total_entries, DEFAULT_MAX_ENTRIES);
        assert_eq!(stats.max_entries, Some(DEFAULT_MAX_ENTRIES));
    }

    #[tokio::test]
    async fn test_inmemory_backend_stats_and_clear() {
        let backend = InMemoryBackend::new();

        backend
            .set("key1", b"value_with_data".to_vec(), None)
            .await
            .expect("Failed to set");
        backend
            .set("key2", b"data".to_vec(), None)
            .await
            .expect("Failed to set");

        let stats = backend.stats().await;
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.expired_entries, 0);
        assert_eq!(stats.total_bytes, 19);

        backend.clear().await;
        assert_eq!(backend.len().await, 0);
    }

    #[tokio::test]
    async fn test_inmemory_backend_clone_shares_store() {
        let backend1 = InMemoryBackend::new();
        backend1
            .set("key", b"value".to_vec(), None)
            .await
            .expect("Failed to set");

        let backend2 = backend1.clone();

        let value = backend2.store.get("key").map(|e| e.data.clone());
        assert_eq!(value, Some(b"value".to_vec()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_inmemory_backend_thread_safe() {
        let backend = InMemoryBackend::bounded(5, EvictionPolicy::LeastRecentlySet);
        let mut handles = vec![];

        for i in 0..20 {
            let b = backend.clone();
            let handle = tokio::spawn(async move {
                let key = format!("key_{}", i);
                let value = format!("value_{}", i);
                b.set(&key, value.into_bytes(), None)
                    .await
                    .expect("Failed to set");
            });
            handles.push(handle);
        }

        for handle in handles {
            handle.await.expect("Task failed");
        }

        assert!(backend.len().await <= 5);
    }
}
