//! Error types for the SWR memoization layer.

use std::fmt;

/// Result type for SWR operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the SWR memoization layer.
///
/// Callers only ever see errors from their own call: a failing background
/// refresh is logged and reported to metrics, never returned to a reader.
#[derive(Debug, Clone)]
pub enum Error {
    /// The call arguments could not be turned into a stable cache key.
    ///
    /// Raised before the fetcher is invoked, so a bad argument type never
    /// produces a silently shared cache entry.
    KeyDerivationError(String),

    /// Serialization failed when converting a value to cache bytes.
    SerializationError(String),

    /// Deserialization failed when converting cache bytes to a value.
    ///
    /// The engine treats this like a miss and fetches again.
    DeserializationError(String),

    /// Cache backend error (Redis, Memcached, custom store).
    ///
    /// Common causes:
    /// - Connection lost or pool exhausted
    /// - Network timeout
    /// - Backend protocol error
    ///
    /// A failing `get` is treated as absent; a failing `set` loses the value
    /// for future hits but not for the caller that fetched it.
    BackendError(String),

    /// The wrapped fetch function failed.
    ///
    /// Propagated on the cold path only. Background refresh failures are
    /// absorbed and the previous value stays authoritative.
    FetchError(String),

    /// Invalid configuration (zero TTL, store TTL shorter than refresh TTL, ...).
    ConfigError(String),

    /// Invalid cache entry: bad magic header or unreadable envelope.
    InvalidCacheEntry(String),

    /// Schema version mismatch between code and cached data.
    VersionMismatch {
        /// Expected schema version (from compiled code)
        expected: u32,
        /// Found schema version (from cached entry)
        found: u32,
    },

    /// The engine has been shut down and will not invoke the fetcher again.
    Shutdown,

    /// Generic error with custom message.
    Other(String),
}

impl Error {
    /// Build a fetch error from anything printable.
    ///
    /// Convenience for fetchers wrapping a foreign error type:
    ///
    /// ```
    /// use swr_memo::Error;
    ///
    /// let err = Error::fetch("upstream returned 503");
    /// assert_eq!(err.to_string(), "Fetch error: upstream returned 503");
    /// ```
    pub fn fetch(msg: impl fmt::Display) -> Self {
        Error::FetchError(msg.to_string())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::KeyDerivationError(msg) => write!(f, "Key derivation error: {}", msg),
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Error::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::FetchError(msg) => write!(f, "Fetch error: {}", msg),
            Error::ConfigError(msg) => write!(f, "Config error: {}", msg),
            Error::InvalidCacheEntry(msg) => {
                write!(f, "Invalid cache entry: {}", msg)
            }
            Error::VersionMismatch { expected, found } => {
                write!(
                    f,
                    "Cache version mismatch: expected {}, found {}",
                    expected, found
                )
            }
            Error::Shutdown => write!(f, "SWR engine has been shut down"),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            Error::BackendError(e.to_string())
        } else if e.is_syntax() || e.is_eof() {
            Error::DeserializationError(e.to_string())
        } else {
            Error::SerializationError(e.to_string())
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::BackendError(e.to_string())
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::Other(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::Other(e.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::BackendError(format!("Redis error: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::KeyDerivationError("map key must be a string".to_string());
        assert_eq!(
            err.to_string(),
            "Key derivation error: map key must be a string"
        );
        assert_eq!(Error::Shutdown.to_string(), "SWR engine has been shut down");
    }

    #[test]
    fn test_error_from_string() {
        let err: Error = "test error".into();
        assert!(matches!(err, Error::Other(_)));
    }

    #[test]
    fn test_json_error_maps_to_serialization() {
        let mut map = std::collections::HashMap::new();
        map.insert(vec![1u8], 1u8);
        let err: Error = serde_json::to_string(&map).unwrap_err().into();
        assert!(matches!(err, Error::SerializationError(_)));
    }
}
