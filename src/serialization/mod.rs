//! Postcard-based value encoding with versioned envelopes.
//!
//! Backends store opaque bytes; the engine encodes every fetched value with
//! this module before `set` and decodes it after `get`.
//!
//! ```text
//! ┌─────────────────┬─────────────────┬──────────────────────────┐
//! │  MAGIC (4 bytes)│VERSION (varint) │POSTCARD PAYLOAD (N bytes)│
//! └─────────────────┴─────────────────┴──────────────────────────┘
//!   "SWRM"              u32                postcard::to_allocvec(R)
//! ```
//!
//! A value that fails validation is never served: the engine treats it as a
//! miss and fetches again, which overwrites the bad entry.
//!
//! ```rust
//! use swr_memo::serialization::{decode_value, encode_value};
//!
//! # fn main() -> swr_memo::Result<()> {
//! let bytes = encode_value(&Some("data:1".to_string()))?;
//! let value: Option<String> = decode_value(&bytes)?;
//! assert_eq!(value.as_deref(), Some("data:1"));
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Magic header for swr-memo entries: b"SWRM"
pub const CACHE_MAGIC: [u8; 4] = *b"SWRM";

/// Current schema version.
///
/// Bump when the envelope layout changes. Entries written under another
/// version are rejected and refetched.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Versioned envelope around a cached value.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CacheEnvelope<T> {
    /// Magic header: must be b"SWRM"
    pub magic: [u8; 4],
    /// Schema version: must match CURRENT_SCHEMA_VERSION
    pub version: u32,
    /// The cached value
    pub payload: T,
}

impl<T> CacheEnvelope<T> {
    pub fn new(payload: T) -> Self {
        Self {
            magic: CACHE_MAGIC,
            version: CURRENT_SCHEMA_VERSION,
            payload,
        }
    }
}

/// Encode a value for storage.
///
/// # Errors
///
/// Returns `Error::SerializationError` if Postcard serialization fails.
pub fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let envelope = CacheEnvelope::new(value);
    postcard::to_allocvec(&envelope).map_err(|e| {
        log::error!("Cache serialization failed: {}", e);
        Error::SerializationError(e.to_string())
    })
}

/// Decode and validate a stored value.
///
/// # Errors
///
/// - `Error::DeserializationError`: corrupted or truncated payload
/// - `Error::InvalidCacheEntry`: wrong magic header
/// - `Error::VersionMismatch`: entry written by another schema version
pub fn decode_value<T>(bytes: &[u8]) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let envelope: CacheEnvelope<T> = postcard::from_bytes(bytes)
        .map_err(|e| Error::DeserializationError(e.to_string()))?;

    if envelope.magic != CACHE_MAGIC {
        return Err(Error::InvalidCacheEntry(format!(
            "Invalid magic: expected {:?}, got {:?}",
            CACHE_MAGIC, envelope.magic
        )));
    }

    if envelope.version != CURRENT_SCHEMA_VERSION {
        return Err(Error::VersionMismatch {
            expected: CURRENT_SCHEMA_VERSION,
            found: envelope.version,
        });
    }

    Ok(envelope.payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
    struct Profile {
        id: u64,
        name: String,
        active: bool,
    }

    fn profile() -> Profile {
        Profile {
            id: 123,
            name: "test".to_string(),
            active: true,
        }
    }

    #[test]
    fn test_envelope_structure() {
        let bytes = encode_value(&profile()).unwrap();
        let envelope: CacheEnvelope<Profile> = postcard::from_bytes(&bytes).unwrap();

        assert_eq!(envelope.magic, CACHE_MAGIC);
        assert_eq!(envelope.version, CURRENT_SCHEMA_VERSION);
        assert_eq!(envelope.payload, profile());
    }

    #[test]
    fn test_falsy_values_are_not_absence() {
        // A cached `None`, `false` or empty string is still a stored value.
        let none: Option<u32> = decode_value(&encode_value(&None::<u32>).unwrap()).unwrap();
        assert_eq!(none, None);

        let empty: String = decode_value(&encode_value(&String::new()).unwrap()).unwrap();
        assert!(empty.is_empty());

        let falsy: bool = decode_value(&encode_value(&false).unwrap()).unwrap();
        assert!(!falsy);
    }

    #[test]
    fn test_invalid_magic_rejected() {
        let mut envelope = CacheEnvelope::new(profile());
        envelope.magic = *b"CKIT";
        let bytes = postcard::to_allocvec(&envelope).unwrap();

        match decode_value::<Profile>(&bytes) {
            Err(Error::InvalidCacheEntry(_)) => {}
            other => panic!("Expected InvalidCacheEntry, got {:?}", other),
        }
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let mut envelope = CacheEnvelope::new(profile());
        envelope.version = 999;
        let bytes = postcard::to_allocvec(&envelope).unwrap();

        match decode_value::<Profile>(&bytes) {
            Err(Error::VersionMismatch { expected, found }) => {
                assert_eq!(expected, CURRENT_SCHEMA_VERSION);
                assert_eq!(found, 999);
            }
            other => panic!("Expected VersionMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let mut bytes = encode_value(&profile()).unwrap();
        let len = bytes.len();
        bytes.truncate(len / 2);

        assert!(matches!(
            decode_value::<Profile>(&bytes),
            Err(Error::DeserializationError(_))
        ));
    }

    #[test]
    fn test_deterministic_encoding() {
        assert_eq!(
            encode_value(&profile()).unwrap(),
            encode_value(&profile()).unwrap()
        );
    }
}
