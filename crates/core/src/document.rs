//! Ordered documents
//!
//! A [`Document`] is an ordered sequence of `(key, value)` entries. Entry
//! order is preserved on every round-trip: inserting a new key appends it,
//! replacing an existing key keeps its position.
//!
//! Every stored document carries a primary key under [`ID_FIELD`]. The
//! document engine assigns one on insert if it is absent and prepends it so
//! that `_id` is the first entry, matching what document stores do.

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::types::ObjectId;
use crate::value::Value;

/// Name of the primary key field
pub const ID_FIELD: &str = "_id";

/// An ordered key-value record
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    entries: Vec<(String, Value)>,
}

impl Document {
    /// Create an empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty document with room for `capacity` entries
    pub fn with_capacity(capacity: usize) -> Self {
        Document {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the document has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a top-level field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Look up a top-level field for mutation
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Look up a field, appending a `Null` entry if it is absent
    pub fn get_or_insert_null(&mut self, key: &str) -> &mut Value {
        let pos = match self.entries.iter().position(|(k, _)| k == key) {
            Some(pos) => pos,
            None => {
                self.entries.push((key.to_string(), Value::Null));
                self.entries.len() - 1
            }
        };
        &mut self.entries[pos].1
    }

    /// True if the field is present (even if its value is `Null`)
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Insert or replace a field. A replaced field keeps its position.
    ///
    /// Returns the previous value, if any.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.get_mut(&key) {
            Some(slot) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Insert a field at the front, removing any existing entry with that key
    pub fn insert_front(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        self.remove(&key);
        self.entries.insert(0, (key, value.into()));
    }

    /// Remove a field, preserving the order of the remaining entries
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    /// Iterate over entries in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterate over keys in order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Query equality: same key set, values compared with [`Value::loose_eq`]
    pub fn loose_eq(&self, other: &Document) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(k, v)| other.get(k).map(|ov| v.loose_eq(ov)).unwrap_or(false))
    }

    /// The `_id` field, if present and an object id
    pub fn id(&self) -> Option<ObjectId> {
        self.get(ID_FIELD).and_then(Value::as_object_id)
    }

    /// Ensure the document has an `_id`, generating and prepending one if absent.
    ///
    /// Returns the id the document ends up with.
    pub fn ensure_id(&mut self) -> Value {
        match self.get(ID_FIELD) {
            Some(existing) => existing.clone(),
            None => {
                let id = Value::ObjectId(ObjectId::new());
                self.entries.insert(0, (ID_FIELD.to_string(), id.clone()));
                id
            }
        }
    }

    /// Build from a JSON object, preserving key order
    pub fn from_json_map(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Document {
            entries: map
                .into_iter()
                .map(|(k, v)| (k, Value::from_json(v)))
                .collect(),
        }
    }

    /// Convert to a JSON object
    pub fn to_json(&self) -> serde_json::Value {
        crate::convert::value_to_json(&Value::Document(self.clone()))
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Document {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut doc = Document::new();
        for (k, v) in iter {
            doc.insert(k, v);
        }
        doc
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Document(d) => Ok(d),
            other => Err(serde::de::Error::custom(format!(
                "expected a document, found {}",
                other.type_name()
            ))),
        }
    }
}

/// Build a [`Document`] from JSON-like syntax.
///
/// ```
/// use trellis_core::doc;
///
/// let d = doc! { "type": "A", "rating": 5, "tags": ["x", "y"] };
/// assert_eq!(d.len(), 3);
/// assert_eq!(d.keys().collect::<Vec<_>>(), vec!["type", "rating", "tags"]);
/// ```
#[macro_export]
macro_rules! doc {
    ($($body:tt)*) => {
        match $crate::__private::json!({ $($body)* }) {
            $crate::__private::JsonValue::Object(map) => $crate::Document::from_json_map(map),
            _ => $crate::Document::new(),
        }
    };
}
