//! Identifier types
//!
//! - ObjectId: 16 bytes of stable identity assigned to every stored document

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Error;

/// Key used when an [`ObjectId`] is represented inside a JSON-shaped value.
pub const OID_KEY: &str = "$oid";

/// Primary key of a stored document.
///
/// Backed by a random (v4) UUID so ids are unique without coordination.
/// Serializes as `{"$oid": "<32 hex chars>"}` so that it survives a trip
/// through any self-describing format and is recognized again by the
/// document adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(Uuid);

impl ObjectId {
    /// Generate a fresh id
    pub fn new() -> Self {
        ObjectId(Uuid::new_v4())
    }

    /// Build an id from raw bytes
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        ObjectId(Uuid::from_bytes(bytes))
    }

    /// Raw bytes
    pub fn bytes(&self) -> [u8; 16] {
        *self.0.as_bytes()
    }

    /// Lowercase hex form without separators
    pub fn to_hex(&self) -> String {
        self.0.simple().to_string()
    }

    /// Parse the hex form produced by [`ObjectId::to_hex`]
    pub fn parse_str(s: &str) -> Result<Self, Error> {
        Uuid::try_parse(s)
            .map(ObjectId)
            .map_err(|e| Error::serialization(format!("invalid object id {:?}: {}", s, e)))
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ObjectId::parse_str(s)
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(OID_KEY, &self.to_hex())?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OidVisitor;

        impl<'de> Visitor<'de> for OidVisitor {
            type Value = ObjectId;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object id as {\"$oid\": hex} or a hex string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<ObjectId, E> {
                ObjectId::parse_str(v).map_err(E::custom)
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<ObjectId, A::Error> {
                let mut id = None;
                while let Some(key) = map.next_key::<String>()? {
                    if key == OID_KEY {
                        let hex: String = map.next_value()?;
                        id = Some(ObjectId::parse_str(&hex).map_err(de::Error::custom)?);
                    } else {
                        map.next_value::<de::IgnoredAny>()?;
                    }
                }
                id.ok_or_else(|| de::Error::missing_field(OID_KEY))
            }
        }

        deserializer.deserialize_any(OidVisitor)
    }
}
