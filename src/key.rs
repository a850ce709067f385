//! Cache key derivation.
//!
//! Every call is mapped to a string key before the store is consulted. The
//! default deriver serializes the argument value to canonical JSON, which is
//! order-sensitive (tuples become arrays) and type-sensitive (`1` and `"1"`
//! produce `[1]` and `["1"]`).

use crate::error::{Error, Result};
use serde::ser::{self, Serializer};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Type alias for a user-supplied key function.
type KeyFn<A> = dyn Fn(&A) -> String + Send + Sync;

/// Builder for namespaced cache keys.
pub struct CacheKeyBuilder;

impl CacheKeyBuilder {
    /// Build cache key with a namespace prefix.
    pub fn build_with_prefix(prefix: &str, id: &dyn fmt::Display) -> String {
        format!("{}:{}", prefix, id)
    }
}

/// Turns call arguments into a [`CacheKey`](crate::CacheKey).
///
/// # Example
///
/// ```
/// use swr_memo::key::KeyDeriver;
///
/// let canonical = KeyDeriver::<(u32, String)>::canonical();
/// assert_eq!(canonical.derive(&(1, "a".to_string())).unwrap(), r#"[1,"a"]"#);
///
/// // Ignore the second argument entirely
/// let custom = KeyDeriver::custom(|args: &(u32, String)| format!("user_{}", args.0));
/// assert_eq!(custom.derive(&(7, "verbose".to_string())).unwrap(), "user_7");
/// ```
pub enum KeyDeriver<A> {
    /// Canonical JSON serialization of the whole argument value.
    Canonical,
    /// Caller-supplied function, for domain-specific key collapsing.
    Custom(Arc<KeyFn<A>>),
}

impl<A> KeyDeriver<A> {
    pub fn canonical() -> Self {
        KeyDeriver::Canonical
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&A) -> String + Send + Sync + 'static,
    {
        KeyDeriver::Custom(Arc::new(f))
    }
}

impl<A: Serialize> KeyDeriver<A> {
    /// Derive the key for one call.
    ///
    /// # Errors
    ///
    /// Returns `Error::KeyDerivationError` if the arguments cannot be
    /// serialized (for example a map keyed by a non-string type), contain a
    /// NaN or infinite float, or if a custom deriver returns an empty key.
    pub fn derive(&self, args: &A) -> Result<String> {
        let key = match self {
            KeyDeriver::Canonical => {
                // serde_json writes NaN and both infinities as `null`
                args.serialize(&mut FiniteFloats)
                    .map_err(|e| Error::KeyDerivationError(e.to_string()))?;
                serde_json::to_string(args)
                    .map_err(|e| Error::KeyDerivationError(e.to_string()))?
            }
            KeyDeriver::Custom(f) => f(args),
        };

        if key.is_empty() {
            return Err(Error::KeyDerivationError(
                "derived cache key is empty".to_string(),
            ));
        }

        Ok(key)
    }
}

impl<A> Clone for KeyDeriver<A> {
    fn clone(&self) -> Self {
        match self {
            KeyDeriver::Canonical => KeyDeriver::Canonical,
            KeyDeriver::Custom(f) => KeyDeriver::Custom(Arc::clone(f)),
        }
    }
}

impl<A> Default for KeyDeriver<A> {
    fn default() -> Self {
        KeyDeriver::Canonical
    }
}

impl<A> fmt::Debug for KeyDeriver<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyDeriver::Canonical => write!(f, "KeyDeriver::Canonical"),
            KeyDeriver::Custom(_) => write!(f, "KeyDeriver::Custom(..)"),
        }
    }
}

/// Walks a value and fails on the first non-finite float.
struct FiniteFloats;

#[derive(Debug)]
struct NonFiniteFloat(String);

impl fmt::Display for NonFiniteFloat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for NonFiniteFloat {}

impl ser::Error for NonFiniteFloat {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        NonFiniteFloat(msg.to_string())
    }
}

fn check_finite(value: f64) -> std::result::Result<(), NonFiniteFloat> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(NonFiniteFloat(format!(
            "{} has no canonical JSON form",
            value
        )))
    }
}

type Checked = std::result::Result<(), NonFiniteFloat>;

impl<'a> Serializer for &'a mut FiniteFloats {
    type Ok = ();
    type Error = NonFiniteFloat;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    fn serialize_bool(self, _: bool) -> Checked {
        Ok(())
    }
    fn serialize_i8(self, _: i8) -> Checked {
        Ok(())
    }
    fn serialize_i16(self, _: i16) -> Checked {
        Ok(())
    }
    fn serialize_i32(self, _: i32) -> Checked {
        Ok(())
    }
    fn serialize_i64(self, _: i64) -> Checked {
        Ok(())
    }
    fn serialize_i128(self, _: i128) -> Checked {
        Ok(())
    }
    fn serialize_u8(self, _: u8) -> Checked {
        Ok(())
    }
    fn serialize_u16(self, _: u16) -> Checked {
        Ok(())
    }
    fn serialize_u32(self, _: u32) -> Checked {
        Ok(())
    }
    fn serialize_u64(self, _: u64) -> Checked {
        Ok(())
    }
    fn serialize_u128(self, _: u128) -> Checked {
        Ok(())
    }
    fn serialize_f32(self, v: f32) -> Checked {
        check_finite(f64::from(v))
    }
    fn serialize_f64(self, v: f64) -> Checked {
        check_finite(v)
    }
    fn serialize_char(self, _: char) -> Checked {
        Ok(())
    }
    fn serialize_str(self, _: &str) -> Checked {
        Ok(())
    }
    fn serialize_bytes(self, _: &[u8]) -> Checked {
        Ok(())
    }
    fn serialize_none(self) -> Checked {
        Ok(())
    }
    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Checked {
        value.serialize(self)
    }
    fn serialize_unit(self) -> Checked {
        Ok(())
    }
    fn serialize_unit_struct(self, _: &'static str) -> Checked {
        Ok(())
    }
    fn serialize_unit_variant(self, _: &'static str, _: u32, _: &'static str) -> Checked {
        Ok(())
    }
    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        value: &T,
    ) -> Checked {
        value.serialize(self)
    }
    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        value: &T,
    ) -> Checked {
        value.serialize(self)
    }
    fn serialize_seq(self, _: Option<usize>) -> std::result::Result<Self, NonFiniteFloat> {
        Ok(self)
    }
    fn serialize_tuple(self, _: usize) -> std::result::Result<Self, NonFiniteFloat> {
        Ok(self)
    }
    fn serialize_tuple_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> std::result::Result<Self, NonFiniteFloat> {
        Ok(self)
    }
    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> std::result::Result<Self, NonFiniteFloat> {
        Ok(self)
    }
    fn serialize_map(self, _: Option<usize>) -> std::result::Result<Self, NonFiniteFloat> {
        Ok(self)
    }
    fn serialize_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> std::result::Result<Self, NonFiniteFloat> {
        Ok(self)
    }
    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> std::result::Result<Self, NonFiniteFloat> {
        Ok(self)
    }
}

impl<'a> ser::SerializeSeq for &'a mut FiniteFloats {
    type Ok = ();
    type Error = NonFiniteFloat;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Checked {
        value.serialize(&mut **self)
    }
    fn end(self) -> Checked {
        Ok(())
    }
}

impl<'a> ser::SerializeTuple for &'a mut FiniteFloats {
    type Ok = ();
    type Error = NonFiniteFloat;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Checked {
        value.serialize(&mut **self)
    }
    fn end(self) -> Checked {
        Ok(())
    }
}

impl<'a> ser::SerializeTupleStruct for &'a mut FiniteFloats {
    type Ok = ();
    type Error = NonFiniteFloat;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Checked {
        value.serialize(&mut **self)
    }
    fn end(self) -> Checked {
        Ok(())
    }
}

impl<'a> ser::SerializeTupleVariant for &'a mut FiniteFloats {
    type Ok = ();
    type Error = NonFiniteFloat;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Checked {
        value.serialize(&mut **self)
    }
    fn end(self) -> Checked {
        Ok(())
    }
}

impl<'a> ser::SerializeMap for &'a mut FiniteFloats {
    type Ok = ();
    type Error = NonFiniteFloat;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Checked {
        key.serialize(&mut **self)
    }
    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Checked {
        value.serialize(&mut **self)
    }
    fn end(self) -> Checked {
        Ok(())
    }
}

impl<'a> ser::SerializeStruct for &'a mut FiniteFloats {
    type Ok = ();
    type Error = NonFiniteFloat;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, _: &'static str, value: &T) -> Checked {
        value.serialize(&mut **self)
    }
    fn end(self) -> Checked {
        Ok(())
    }
}

impl<'a> ser::SerializeStructVariant for &'a mut FiniteFloats {
    type Ok = ();
    type Error = NonFiniteFloat;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, _: &'static str, value: &T) -> Checked {
        value.serialize(&mut **self)
    }
    fn end(self) -> Checked {
        Ok(())
    }
}
