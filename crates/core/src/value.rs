//! Value types for Trellis documents
//!
//! This module defines:
//! - Value: the closed set of value shapes a document field can hold
//!
//! ## Equality
//!
//! Two notions of equality exist and they are used in different places:
//!
//! - `PartialEq` is strict and structural: `Int32(1) != Int64(1)`, entry
//!   order matters for documents. It is what tests and round-trips compare.
//! - [`Value::loose_eq`] is what queries use: numbers compare by value across
//!   widths (`Int32(5) == Int64(5) == Double(5.0)`) and sub-documents compare
//!   as key sets. Filter `$eq`, `$pull` by value and `$addToSet` use it.
//!
//! Float equality follows IEEE-754 in both: `NaN != NaN`, `-0.0 == 0.0`.
//!
//! ## Decoding
//!
//! Wire formats do not keep integer width, so decoding picks the narrowest
//! shape: `Int64(5)` comes back as `Int32(5)`. Floats, NaN and infinities
//! included, come back unchanged.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::{self, DeserializeOwned, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

use crate::convert::BINARY_KEY;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::types::{ObjectId, OID_KEY};

/// A single document field value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Null value (also the value of a hole created by an index write)
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// 32-bit signed integer (8 and 16-bit integers widen to this)
    Int32(i32),
    /// 64-bit signed integer
    Int64(i64),
    /// 64-bit floating point (32-bit floats widen to this)
    Double(f64),
    /// UTF-8 string
    String(String),
    /// Raw bytes
    Binary(Vec<u8>),
    /// Document identity
    ObjectId(ObjectId),
    /// Nested document
    Document(Document),
    /// Array of values
    Array(Vec<Value>),
}

impl Value {
    /// Get the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int32(_) => "Int32",
            Value::Int64(_) => "Int64",
            Value::Double(_) => "Double",
            Value::String(_) => "String",
            Value::Binary(_) => "Binary",
            Value::ObjectId(_) => "ObjectId",
            Value::Document(_) => "Document",
            Value::Array(_) => "Array",
        }
    }

    /// Wrap raw bytes
    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        Value::Binary(bytes.into())
    }

    /// Check if this is a null value
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if this is an integer of any width
    pub fn is_integer(&self) -> bool {
        matches!(self, Value::Int32(_) | Value::Int64(_))
    }

    /// Check if this is any numeric value
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int32(_) | Value::Int64(_) | Value::Double(_))
    }

    /// Check if this is an array
    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    /// Check if this is a nested document
    pub fn is_document(&self) -> bool {
        matches!(self, Value::Document(_))
    }

    /// Get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as i64 if this is an integer of any width
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(i) => Some(*i as i64),
            Value::Int64(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as f64 if this is any numeric value
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int32(i) => Some(*i as f64),
            Value::Int64(i) => Some(*i as f64),
            Value::Double(f) => Some(*f),
            _ => None,
        }
    }

    /// Get as string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as object id
    pub fn as_object_id(&self) -> Option<ObjectId> {
        match self {
            Value::ObjectId(id) => Some(*id),
            _ => None,
        }
    }

    /// Get as nested document
    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(d) => Some(d),
            _ => None,
        }
    }

    /// Get as mutable nested document
    pub fn as_document_mut(&mut self) -> Option<&mut Document> {
        match self {
            Value::Document(d) => Some(d),
            _ => None,
        }
    }

    /// Get as array slice
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get as mutable array
    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Query equality: numbers compare by value across widths, documents
    /// compare as key sets, everything else structurally.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_integer() && b.is_integer() => a.as_i64() == b.as_i64(),
            (a, b) if a.is_number() && b.is_number() => a.as_f64() == b.as_f64(),
            (Value::Document(a), Value::Document(b)) => a.loose_eq(b),
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.loose_eq(y))
            }
            (a, b) => a == b,
        }
    }

    /// Order two numeric values, promoting to f64 unless both are integers.
    ///
    /// Returns `None` if either side is not numeric or a NaN is involved.
    pub fn compare_numeric(&self, other: &Value) -> Option<Ordering> {
        match (self.as_i64(), other.as_i64()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => self.as_f64()?.partial_cmp(&other.as_f64()?),
        }
    }

    /// Convert from the JSON form used by the serde adapter
    pub fn from_json(json: serde_json::Value) -> Self {
        crate::convert::json_to_value(json)
    }

    /// Convert to the JSON form used by the serde adapter
    pub fn to_json(&self) -> serde_json::Value {
        crate::convert::value_to_json(self)
    }

    /// Decode into any deserializable type
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.to_json()).map_err(Error::from)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int32(i) => serializer.serialize_i32(*i),
            Value::Int64(i) => serializer.serialize_i64(*i),
            Value::Double(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::ObjectId(id) => id.serialize(serializer),
            Value::Document(d) => d.serialize(serializer),
            Value::Array(a) => a.serialize(serializer),
            Value::Binary(_) => self.to_json().serialize(serializer),
        }
    }
}

fn int_value(i: i64) -> Value {
    match i32::try_from(i) {
        Ok(small) => Value::Int32(small),
        Err(_) => Value::Int64(i),
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a document value")
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E: de::Error>(self) -> std::result::Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> std::result::Result<Value, D::Error> {
        Value::deserialize(d)
    }

    fn visit_bool<E: de::Error>(self, b: bool) -> std::result::Result<Value, E> {
        Ok(Value::Bool(b))
    }

    fn visit_i64<E: de::Error>(self, i: i64) -> std::result::Result<Value, E> {
        Ok(int_value(i))
    }

    fn visit_u64<E: de::Error>(self, u: u64) -> std::result::Result<Value, E> {
        Ok(match i64::try_from(u) {
            Ok(i) => int_value(i),
            Err(_) => Value::Double(u as f64),
        })
    }

    fn visit_f64<E: de::Error>(self, f: f64) -> std::result::Result<Value, E> {
        Ok(Value::Double(f))
    }

    fn visit_str<E: de::Error>(self, s: &str) -> std::result::Result<Value, E> {
        Ok(Value::String(s.to_string()))
    }

    fn visit_string<E: de::Error>(self, s: String) -> std::result::Result<Value, E> {
        Ok(Value::String(s))
    }

    fn visit_bytes<E: de::Error>(self, b: &[u8]) -> std::result::Result<Value, E> {
        Ok(Value::Binary(b.to_vec()))
    }

    fn visit_byte_buf<E: de::Error>(self, b: Vec<u8>) -> std::result::Result<Value, E> {
        Ok(Value::Binary(b))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element::<Value>()? {
            items.push(item);
        }
        Ok(Value::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Value, A::Error> {
        let mut doc = Document::new();
        while let Some((key, value)) = map.next_entry::<String, Value>()? {
            doc.insert(key, value);
        }
        if doc.len() == 1 {
            if let Some(Value::String(hex)) = doc.get(OID_KEY) {
                if let Ok(id) = ObjectId::parse_str(hex) {
                    return Ok(Value::ObjectId(id));
                }
            }
            if let Some(Value::String(b64)) = doc.get(BINARY_KEY) {
                if let Ok(bytes) = STANDARD.decode(b64) {
                    return Ok(Value::Binary(bytes));
                }
            }
        }
        Ok(Value::Document(doc))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

// =============================================================================
// From implementations
// =============================================================================

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i8> for Value {
    fn from(i: i8) -> Self {
        Value::Int32(i as i32)
    }
}

impl From<i16> for Value {
    fn from(i: i16) -> Self {
        Value::Int32(i as i32)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int32(i)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int64(i)
    }
}

impl From<u8> for Value {
    fn from(i: u8) -> Self {
        Value::Int32(i as i32)
    }
}

impl From<u16> for Value {
    fn from(i: u16) -> Self {
        Value::Int32(i as i32)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int64(i as i64)
    }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Double(f as f64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Double(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Value::ObjectId(id)
    }
}

impl From<Document> for Value {
    fn from(d: Document) -> Self {
        Value::Document(d)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::from_json(json)
    }
}
