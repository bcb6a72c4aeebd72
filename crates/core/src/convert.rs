//! Serde adapter between caller types and [`Document`]s
//!
//! Caller structs are converted through `serde_json` (with key order
//! preserved) into the document model. Two value shapes that JSON cannot
//! express natively use a tagged single-key object:
//!
//! | Value      | JSON form                      |
//! |------------|--------------------------------|
//! | `ObjectId` | `{"$oid": "<32 hex chars>"}`   |
//! | `Binary`   | `{"$binary": "<base64>"}`      |
//!
//! Integers that fit in 32 bits become `Int32`, larger ones `Int64`.
//! Unsigned integers beyond `i64::MAX` and all non-integral numbers become
//! `Double`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::document::Document;
use crate::error::{Error, Result};
use crate::types::{ObjectId, OID_KEY};
use crate::value::Value;

/// Key used for binary values in the JSON form
pub const BINARY_KEY: &str = "$binary";

/// Convert any serializable value into a document.
///
/// Fails if the value does not serialize to a JSON object.
pub fn to_document<T: Serialize + ?Sized>(value: &T) -> Result<Document> {
    match to_value(value)? {
        Value::Document(d) => Ok(d),
        other => Err(Error::serialization(format!(
            "expected a document, found {}",
            other.type_name()
        ))),
    }
}

/// Decode a document into a caller type
pub fn from_document<T: DeserializeOwned>(doc: &Document) -> Result<T> {
    serde_json::from_value(doc.to_json()).map_err(Error::from)
}

/// Convert any serializable value into a [`Value`]
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    let json = serde_json::to_value(value)?;
    Ok(json_to_value(json))
}

/// Decode a [`Value`] into a caller type
pub fn from_value<T: DeserializeOwned>(value: &Value) -> Result<T> {
    value.decode()
}

pub(crate) fn json_to_value(json: serde_json::Value) -> Value {
    use serde_json::Value as Json;

    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                match i32::try_from(i) {
                    Ok(small) => Value::Int32(small),
                    Err(_) => Value::Int64(i),
                }
            } else {
                Value::Double(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Json::String(s) => Value::String(s),
        Json::Array(a) => Value::Array(a.into_iter().map(json_to_value).collect()),
        Json::Object(map) => {
            if map.len() == 1 {
                if let Some(Json::String(hex)) = map.get(OID_KEY) {
                    if let Ok(id) = ObjectId::parse_str(hex) {
                        return Value::ObjectId(id);
                    }
                }
                if let Some(Json::String(b64)) = map.get(BINARY_KEY) {
                    if let Ok(bytes) = STANDARD.decode(b64) {
                        return Value::Binary(bytes);
                    }
                }
            }
            Value::Document(Document::from_json_map(map))
        }
    }
}

pub(crate) fn value_to_json(value: &Value) -> serde_json::Value {
    use serde_json::Value as Json;

    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int32(i) => Json::from(*i),
        Value::Int64(i) => Json::from(*i),
        Value::Double(f) => serde_json::Number::from_f64(*f)
            .map(Json::Number)
            .unwrap_or(Json::Null),
        Value::String(s) => Json::String(s.clone()),
        Value::Binary(bytes) => {
            let mut map = serde_json::Map::new();
            map.insert(BINARY_KEY.to_string(), Json::String(STANDARD.encode(bytes)));
            Json::Object(map)
        }
        Value::ObjectId(id) => {
            let mut map = serde_json::Map::new();
            map.insert(OID_KEY.to_string(), Json::String(id.to_hex()));
            Json::Object(map)
        }
        Value::Document(d) => {
            let mut map = serde_json::Map::with_capacity(d.len());
            for (k, v) in d.iter() {
                map.insert(k.to_string(), value_to_json(v));
            }
            Json::Object(map)
        }
        Value::Array(a) => Json::Array(a.iter().map(value_to_json).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ID_FIELD;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct PostInfo {
        post_id: i64,
        timestamp: i64,
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct UserPosts {
        user_id: i64,
        posts: Vec<PostInfo>,
    }

    #[test]
    fn test_struct_to_document_keeps_field_order() {
        let posts = UserPosts {
            user_id: 3,
            posts: vec![PostInfo {
                post_id: 9,
                timestamp: 100,
            }],
        };
        let d = to_document(&posts).unwrap();
        assert_eq!(d.keys().collect::<Vec<_>>(), vec!["user_id", "posts"]);
        let back: UserPosts = from_document(&d).unwrap();
        assert_eq!(back, posts);
    }

    #[test]
    fn test_scalar_is_not_a_document() {
        let err = to_document(&5).unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_integer_widths() {
        assert_eq!(to_value(&5i64).unwrap(), Value::Int32(5));
        assert_eq!(to_value(&(1i64 << 40)).unwrap(), Value::Int64(1 << 40));
        assert_eq!(to_value(&u64::MAX).unwrap(), Value::Double(u64::MAX as f64));
        assert_eq!(to_value(&2.5).unwrap(), Value::Double(2.5));
    }

    #[test]
    fn test_object_id_field_survives_adapter() {
        #[derive(Serialize, Deserialize)]
        struct WithId {
            #[serde(rename = "_id")]
            id: ObjectId,
            name: String,
        }

        let id = ObjectId::new();
        let d = to_document(&WithId {
            id,
            name: "x".into(),
        })
        .unwrap();
        assert_eq!(d.get(ID_FIELD), Some(&Value::ObjectId(id)));
        let back: WithId = from_document(&d).unwrap();
        assert_eq!(back.id, id);
    }

    #[test]
    fn test_binary_json_form() {
        let v = Value::binary(vec![1u8, 2, 3]);
        let json = v.to_json();
        assert!(json.get(BINARY_KEY).is_some());
        assert_eq!(Value::from_json(json), v);
    }

    #[test]
    fn test_unknown_fields_ignored_on_decode() {
        let mut d = crate::doc! { "post_id": 1, "timestamp": 2 };
        d.ensure_id();
        let info: PostInfo = from_document(&d).unwrap();
        assert_eq!(
            info,
            PostInfo {
                post_id: 1,
                timestamp: 2
            }
        );
    }
}
