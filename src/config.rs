//! Engine configuration.
//!
//! ```
//! use swr_memo::SwrConfig;
//! use std::time::Duration;
//!
//! let config = SwrConfig::new(Duration::from_secs(1))
//!     .with_store_ttl(Duration::from_secs(5))
//!     .with_namespace("users")
//!     .with_single_flight(true);
//! assert!(config.validate().is_ok());
//! assert_eq!(config.effective_store_ttl(), Duration::from_secs(5));
//! ```

use crate::error::{Error, Result};
use std::time::Duration;

/// Default store TTL as a multiple of the refresh interval.
pub const STORE_TTL_FACTOR: u32 = 2;

/// Settings shared by every call on one engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwrConfig {
    /// Refresh interval. A key's background refetch runs `ttl` after its
    /// previous fetch landed.
    pub ttl: Duration,

    /// TTL handed to the store on every `set`. Defaults to twice `ttl`, so
    /// the cached value is still readable while its refresh is in flight.
    ///
    /// Must not be shorter than `ttl`: a store that evicts before the
    /// scheduler refreshes turns warm keys into cold misses.
    pub store_ttl: Option<Duration>,

    /// Prefix for every key, so several engines can share one remote store.
    pub namespace: Option<String>,

    /// Deduplicate concurrent cold fetches for the same key.
    pub single_flight: bool,
}

impl SwrConfig {
    pub fn new(ttl: Duration) -> Self {
        SwrConfig {
            ttl,
            store_ttl: None,
            namespace: None,
            single_flight: false,
        }
    }

    pub fn with_store_ttl(mut self, store_ttl: Duration) -> Self {
        self.store_ttl = Some(store_ttl);
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_single_flight(mut self, enabled: bool) -> Self {
        self.single_flight = enabled;
        self
    }

    /// TTL passed to the store.
    pub fn effective_store_ttl(&self) -> Duration {
        self.store_ttl.unwrap_or_else(|| self.ttl.saturating_mul(STORE_TTL_FACTOR))
    }

    /// Check the configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigError` for a zero `ttl`, a `store_ttl` shorter
    /// than `ttl`, or an empty namespace.
    pub fn validate(&self) -> Result<()> {
        if self.ttl.is_zero() {
            return Err(Error::ConfigError("ttl must be greater than zero".to_string()));
        }

        if let Some(store_ttl) = self.store_ttl {
            if store_ttl < self.ttl {
                return Err(Error::ConfigError(format!(
                    "store_ttl ({:?}) must not be shorter than ttl ({:?})",
                    store_ttl, self.ttl
                )));
            }
        }

        if matches!(self.namespace.as_deref(), Some("")) {
            return Err(Error::ConfigError("namespace must not be empty".to_string()));
        }

        Ok(())
    }

    /// Load from the environment.
    ///
    /// | Variable | Meaning |
    /// |----------|---------|
    /// | `SWR_TTL_MS` | refresh interval in milliseconds (required) |
    /// | `SWR_STORE_TTL_MS` | store TTL in milliseconds |
    /// | `SWR_NAMESPACE` | key prefix |
    /// | `SWR_SINGLE_FLIGHT` | `true`/`1` to dedupe cold fetches |
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigError` if `SWR_TTL_MS` is missing, a number does
    /// not parse, or the result fails [`validate`](Self::validate).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let millis = |name: &str| -> Result<Option<Duration>> {
            match lookup(name) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(|ms| Some(Duration::from_millis(ms)))
                    .map_err(|e| Error::ConfigError(format!("{} is not a number: {}", name, e))),
                None => Ok(None),
            }
        };

        let ttl = millis("SWR_TTL_MS")?
            .ok_or_else(|| Error::ConfigError("SWR_TTL_MS is not set".to_string()))?;

        let config = SwrConfig {
            ttl,
            store_ttl: millis("SWR_STORE_TTL_MS")?,
            namespace: lookup("SWR_NAMESPACE"),
            single_flight: lookup("SWR_SINGLE_FLIGHT")
                .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "yes"))
                .unwrap_or(false),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_store_ttl_defaults_to_twice_ttl() {
        let config = SwrConfig::new(Duration::from_millis(1000));
        assert_eq!(config.effective_store_ttl(), Duration::from_millis(2000));
        assert!(config.validate().is_ok());
        assert!(!config.single_flight);
    }

    #[test]
    fn test_explicit_store_ttl_wins() {
        let config = SwrConfig::new(Duration::from_millis(1000))
            .with_store_ttl(Duration::from_millis(1000));
        assert_eq!(config.effective_store_ttl(), Duration::from_millis(1000));
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let config = SwrConfig::new(Duration::ZERO);
        assert!(matches!(config.validate(), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_store_ttl_shorter_than_ttl_rejected() {
        let config = SwrConfig::new(Duration::from_secs(10)).with_store_ttl(Duration::from_secs(5));
        assert!(matches!(config.validate(), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_empty_namespace_rejected() {
        let config = SwrConfig::new(Duration::from_secs(1)).with_namespace("");
        assert!(matches!(config.validate(), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_from_lookup() {
        let config = SwrConfig::from_lookup(lookup(&[
            ("SWR_TTL_MS", "1500"),
            ("SWR_STORE_TTL_MS", "3000"),
            ("SWR_NAMESPACE", "reports"),
            ("SWR_SINGLE_FLIGHT", "true"),
        ]))
        .expect("config should load");

        assert_eq!(config.ttl, Duration::from_millis(1500));
        assert_eq!(config.store_ttl, Some(Duration::from_millis(3000)));
        assert_eq!(config.namespace.as_deref(), Some("reports"));
        assert!(config.single_flight);
    }

    #[test]
    fn test_from_lookup_requires_ttl() {
        assert!(matches!(
            SwrConfig::from_lookup(lookup(&[])),
            Err(Error::ConfigError(_))
        ));
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        assert!(matches!(
            SwrConfig::from_lookup(lookup(&[("SWR_TTL_MS", "soon")])),
            Err(Error::ConfigError(_))
        ));
    }
}
