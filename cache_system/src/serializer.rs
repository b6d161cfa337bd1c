//! JSON wire encoding for cache keys and values

use crate::errors::CacheError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde::ser::{self, Error as _, Serializer};

/// Stateless JSON codec
///
/// Values go through a [`serde_json::Value`] tree before being written, so
/// map members always come out in sorted key order and equal values encode
/// to identical bytes regardless of hash map iteration order.
///
/// `NaN` and infinities are rejected, since JSON would store them as `null`.
/// Nested options collapse: `Some(None)` reads back as `None`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl JsonSerializer {
    pub fn new() -> Self {
        Self
    }

    pub fn serialize<T>(&self, value: &T) -> Result<Vec<u8>, CacheError>
    where
        T: Serialize + ?Sized,
    {
        value
            .serialize(FiniteFloats)
            .map_err(CacheError::Serialization)?;
        let tree = serde_json::to_value(value).map_err(CacheError::Serialization)?;
        serde_json::to_vec(&tree).map_err(CacheError::Serialization)
    }

    pub fn deserialize<T>(&self, bytes: &[u8]) -> Result<T, CacheError>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(bytes).map_err(CacheError::Deserialization)
    }
}

/// Walks a value without producing output, failing on the first float JSON
/// cannot represent
#[derive(Clone, Copy)]
struct FiniteFloats;

impl FiniteFloats {
    fn check(value: f64) -> Result<(), serde_json::Error> {
        if value.is_finite() {
            Ok(())
        } else {
            Err(serde_json::Error::custom(format!(
                "{value} has no JSON representation"
            )))
        }
    }
}

impl Serializer for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    fn serialize_bool(self, _: bool) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_i8(self, _: i8) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_i16(self, _: i16) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_i32(self, _: i32) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_i64(self, _: i64) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_i128(self, _: i128) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_u8(self, _: u8) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_u16(self, _: u16) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_u32(self, _: u32) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_u64(self, _: u64) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_u128(self, _: u128) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_f32(self, value: f32) -> Result<(), Self::Error> {
        Self::check(f64::from(value))
    }

    fn serialize_f64(self, value: f64) -> Result<(), Self::Error> {
        Self::check(value)
    }

    fn serialize_char(self, _: char) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_str(self, _: &str) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_bytes(self, _: &[u8]) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_none(self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<(), Self::Error> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_unit_struct(self, _: &'static str) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_unit_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
    ) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        value.serialize(self)
    }

    fn serialize_seq(self, _: Option<usize>) -> Result<Self, Self::Error> {
        Ok(self)
    }

    fn serialize_tuple(self, _: usize) -> Result<Self, Self::Error> {
        Ok(self)
    }

    fn serialize_tuple_struct(self, _: &'static str, _: usize) -> Result<Self, Self::Error> {
        Ok(self)
    }

    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self, Self::Error> {
        Ok(self)
    }

    fn serialize_map(self, _: Option<usize>) -> Result<Self, Self::Error> {
        Ok(self)
    }

    fn serialize_struct(self, _: &'static str, _: usize) -> Result<Self, Self::Error> {
        Ok(self)
    }

    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self, Self::Error> {
        Ok(self)
    }
}

impl ser::SerializeSeq for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        value.serialize(*self)
    }

    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl ser::SerializeTuple for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        value.serialize(*self)
    }

    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl ser::SerializeTupleStruct for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        value.serialize(*self)
    }

    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl ser::SerializeTupleVariant for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        value.serialize(*self)
    }

    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl ser::SerializeMap for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<(), Self::Error> {
        key.serialize(*self)
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        value.serialize(*self)
    }

    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl ser::SerializeStruct for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        _: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        value.serialize(*self)
    }

    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl ser::SerializeStructVariant for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        _: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        value.serialize(*self)
    }

    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}
