//! Cache store implementations.

use crate::error::Result;
use std::future::Future;
use std::time::Duration;

pub mod inmemory;
#[cfg(feature = "memcached")]
pub mod memcached;
#[cfg(feature = "redis")]
pub mod redis;

pub use inmemory::{CacheStats, EvictionPolicy, InMemoryBackend, InMemoryConfig};
#[cfg(feature = "memcached")]
pub use memcached::{MemcachedBackend, MemcachedConfig};
#[cfg(feature = "redis")]
pub use redis::{PoolStats, RedisBackend, RedisConfig};

/// Trait for cache store implementations.
///
/// The engine only ever mutates a store through [`set`](CacheBackend::set):
/// every refresh overwrites the whole value, so there is no partial update
/// that a concurrent refresh could lose.
///
/// **IMPORTANT:** All methods use `&self`. Implementations use interior
/// mutability or external storage.
///
/// **ASYNC:** The returned futures must be `Send`, because background
/// refreshes run on spawned tokio tasks. Implementations may still be
/// written with `async fn`.
pub trait CacheBackend: Send + Sync + Clone {
    /// Retrieve value from cache by key.
    ///
    /// # Returns
    /// - `Ok(Some(bytes))` - Value found in cache
    /// - `Ok(None)` - Absent (never stored, expired, or evicted)
    ///
    /// # Errors
    /// Returns `Err` if the store itself failed. A failure must never be
    /// reported as `Ok(None)`: that would hide an outage behind a miss.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Store value in cache with optional TTL.
    ///
    /// # Arguments
    /// - `key`: Cache key
    /// - `value`: Encoded value bytes
    /// - `ttl`: Time after which the store may evict. None = no store-side expiry
    ///
    /// # Errors
    /// Returns `Err` if the store failed to persist the value
    fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Check if key exists in cache.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    fn exists(&self, key: &str) -> impl Future<Output = Result<bool>> + Send {
        async move { Ok(self.get(key).await?.is_some()) }
    }

    /// Health check - verify backend is accessible.
    ///
    /// # Errors
    /// Returns `Err` if backend is not accessible
    fn health_check(&self) -> impl Future<Output = Result<bool>> + Send {
        async { Ok(true) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_backend_exists_default() {
        let backend = InMemoryBackend::new();
        backend
            .set("key", vec![1, 2, 3], None)
            .await
            .expect("Failed to set key");
        assert!(backend.exists("key").await.expect("Failed to check exists"));
        assert!(!backend
            .exists("nonexistent")
            .await
            .expect("Failed to check exists"));
    }

    #[tokio::test]
    async fn test_backend_health_check_default() {
        let backend = InMemoryBackend::new();
        assert!(backend.health_check().await.expect("Health check failed"));
    }
}
