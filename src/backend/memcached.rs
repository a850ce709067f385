//! Memcached cache backend implementation.

use super::CacheBackend;
use crate::error::{Error, Result};
use async_memcached::AsciiProtocol;
use deadpool_memcached::{Manager, Pool};
use std::time::Duration;

/// Default Memcached connection pool size.
/// Override with MEMCACHED_POOL_SIZE environment variable
const DEFAULT_POOL_SIZE: u32 = 16;

/// Configuration for Memcached backend.
#[derive(Clone, Debug)]
pub struct MemcachedConfig {
    pub servers: Vec<String>, // e.g., ["localhost:11211"]
    pub connection_timeout: Duration,
    pub pool_size: u32,
}

impl Default for MemcachedConfig {
    fn default() -> Self {
        MemcachedConfig {
            servers: vec!["localhost:11211".to_string()],
            connection_timeout: Duration::from_secs(5),
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

/// Memcached expirations are whole seconds. Round up so the store never
/// evicts before the refresh scheduler fires.
fn ttl_seconds(ttl: Duration) -> i64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1) as i64
}

/// Memcached store with connection pooling.
///
/// # Example
///
/// ```no_run
/// # use swr_memo::backend::{MemcachedBackend, MemcachedConfig, CacheBackend};
/// # use swr_memo::error::Result;
/// # async fn example() -> Result<()> {
/// let backend = MemcachedBackend::new(MemcachedConfig::default()).await?;
/// backend.set("key", b"value".to_vec(), None).await?;
/// let value = backend.get("key").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MemcachedBackend {
    pool: Pool,
    connection_timeout: Duration,
}

impl MemcachedBackend {
    /// Create new Memcached backend from configuration.
    ///
    /// Only the first server is used; deadpool-memcached manages one address.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` if no server is given or the pool cannot be built
    pub async fn new(config: MemcachedConfig) -> Result<Self> {
        let addr = config
            .servers
            .first()
            .ok_or_else(|| Error::ConfigError("No memcached servers specified".to_string()))?
            .clone();

        let pool = Pool::builder(Manager::new(addr.clone()))
            .max_size(config.pool_size as usize)
            .build()
            .map_err(|e| Error::ConfigError(format!("Failed to create connection pool: {}", e)))?;

        info!(
            "✓ Memcached backend initialized with server: {} (pool size: {})",
            addr, config.pool_size
        );

        Ok(MemcachedBackend {
            pool,
            connection_timeout: config.connection_timeout,
        })
    }

    /// Create from server address directly, honoring `MEMCACHED_POOL_SIZE`.
    ///
    /// # Errors
    /// Returns `Err` if connection pool creation fails
    pub async fn from_server(addr: String) -> Result<Self> {
        let pool_size = std::env::var("MEMCACHED_POOL_SIZE")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_POOL_SIZE);

        Self::new(MemcachedConfig {
            servers: vec![addr],
            pool_size,
            ..Default::default()
        })
        .await
    }

    async fn connection(&self) -> Result<deadpool_memcached::Object> {
        tokio::time::timeout(self.connection_timeout, self.pool.get())
            .await
            .map_err(|_| {
                Error::BackendError(format!(
                    "Timed out after {:?} waiting for a Memcached connection",
                    self.connection_timeout
                ))
            })?
            .map_err(|e| Error::BackendError(format!("Failed to get Memcached connection: {}", e)))
    }
}

impl CacheBackend for MemcachedBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.connection().await?;

        match conn.get(key).await {
            Ok(Some(value)) => {
                debug!("✓ Memcached GET {} -> HIT", key);
                Ok(value.data)
            }
            Ok(None) => {
                debug!("✓ Memcached GET {} -> MISS", key);
                Ok(None)
            }
            Err(e) => Err(Error::BackendError(format!(
                "Memcached GET failed for key {}: {}",
                key, e
            ))),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.connection().await?;

        let expiration = ttl.map(ttl_seconds);

        conn.set(key, value.as_slice(), expiration, None)
            .await
            .map_err(|e| {
                Error::BackendError(format!("Memcached SET failed for key {}: {}", key, e))
            })?;

        match expiration {
            Some(secs) => debug!("✓ Memcached SET {} (TTL: {}s)", key, secs),
            None => debug!("✓ Memcached SET {}", key),
        }

        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        match self.connection().await {
            Ok(mut conn) => Ok(conn.get("__swr_health_check__").await.is_ok()),
            Err(_) => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memcached_config_default() {
        let config = MemcachedConfig::default();
        assert_eq!(config.servers, vec!["localhost:11211".to_string()]);
        assert_eq!(config.pool_size, DEFAULT_POOL_SIZE);
    }

    #[test]
    fn test_ttl_rounds_up_to_whole_seconds() {
        assert_eq!(ttl_seconds(Duration::from_millis(1000)), 1);
        assert_eq!(ttl_seconds(Duration::from_millis(1001)), 2);
        assert_eq!(ttl_seconds(Duration::from_millis(250)), 1);
        assert_eq!(ttl_seconds(Duration::from_secs(60)), 60);
    }

    #[tokio::test]
    async fn test_memcached_no_servers_is_config_error() {
        let config = MemcachedConfig {
            servers: vec![],
            ..Default::default()
        };

        match MemcachedBackend::new(config).await {
            Err(Error::ConfigError(_)) => {}
            Err(e) => panic!("Expected ConfigError, got {:?}", e),
            Ok(_) => panic!("Expected ConfigError, got a backend"),
        }
    }

    #[tokio::test]
    async fn test_connection_timeout_bounds_unreachable_server() {
        let config = MemcachedConfig {
            servers: vec!["10.255.255.1:11211".to_string()],
            connection_timeout: Duration::from_millis(200),
            pool_size: 1,
        };
        let backend = MemcachedBackend::new(config)
            .await
            .expect("Failed to create backend");
        assert_eq!(backend.connection_timeout, Duration::from_millis(200));

        let started = std::time::Instant::now();
        let result = backend.get("key").await;

        assert!(matches!(result, Err(Error::BackendError(_))));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!backend.health_check().await.expect("Health check errored"));
    }

    // Integration tests - require running memcached server
    // Run with: cargo test --features memcached -- --ignored
    #[tokio::test]
    #[ignore]
    async fn test_memcached_backend_set_get() {
        let backend = MemcachedBackend::from_server("localhost:11211".to_string())
            .await
            .expect("Failed to create backend");

        backend
            .set("swr_mc_key", b"value".to_vec(), Some(Duration::from_secs(5)))
            .await
            .expect("Failed to set");

        assert_eq!(
            backend.get("swr_mc_key").await.expect("Failed to get"),
            Some(b"value".to_vec())
        );
    }
}
