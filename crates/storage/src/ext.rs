//! Typed helpers over [`NoSqlCollection`]
//!
//! The collection traits speak [`Document`]; these helpers add the serde
//! conversion on both sides so repositories can work with their own structs.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use trellis_core::{to_document, Document, ObjectId, Result, Value, ID_FIELD};

use crate::traits::NoSqlCollection;

/// Filter matching a single `_id`
pub fn id_filter(id: impl Into<Value>) -> Document {
    let mut filter = Document::new();
    filter.insert(ID_FIELD, id);
    filter
}

/// Filter matching documents whose `field` equals any of `values`
pub fn in_filter<V: Into<Value>>(field: &str, values: impl IntoIterator<Item = V>) -> Document {
    let values: Vec<Value> = values.into_iter().map(Into::into).collect();
    let mut condition = Document::new();
    condition.insert("$in", Value::Array(values));
    let mut filter = Document::new();
    filter.insert(field, condition);
    filter
}

/// Serde-typed convenience methods, implemented for every collection
#[async_trait]
pub trait CollectionExt: NoSqlCollection {
    /// Serialize and insert a value. Returns the assigned `_id`.
    async fn insert<T>(&self, value: &T) -> Result<Value>
    where
        T: Serialize + Sync,
    {
        let doc = to_document(value)?;
        self.insert_one(doc).await
    }

    /// Decode the first document matching `filter`
    async fn find_one_as<T>(&self, filter: &Document) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        self.find_one(filter, None).await?.one()
    }

    /// Decode every document matching `filter`
    async fn find_many_as<T>(&self, filter: &Document) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Send,
    {
        self.find_many(filter, None).await?.all()
    }

    /// Serialize a value and upsert it under `id`
    async fn upsert_by_id_as<T>(&self, id: ObjectId, value: &T) -> Result<bool>
    where
        T: Serialize + Sync,
    {
        let doc = to_document(value)?;
        self.upsert_by_id(id, doc).await
    }
}

impl<C: NoSqlCollection + ?Sized> CollectionExt for C {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCollection;
    use serde::Deserialize;
    use std::sync::Arc;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Profile {
        user_id: i64,
        username: String,
    }

    #[test]
    fn test_in_filter_shape() {
        let filter = in_filter("user_id", vec![1i64, 2]);
        let cond = filter.get("user_id").and_then(Value::as_document).unwrap();
        assert_eq!(cond.get("$in").and_then(Value::as_array).map(|a| a.len()), Some(2));
    }

    #[tokio::test]
    async fn test_typed_roundtrip_through_trait_object() {
        let coll: Arc<dyn NoSqlCollection> = Arc::new(MemoryCollection::new("user"));
        let alice = Profile {
            user_id: 1,
            username: "alice".into(),
        };
        let bob = Profile {
            user_id: 2,
            username: "bob".into(),
        };
        coll.insert(&alice).await.unwrap();
        coll.insert(&bob).await.unwrap();

        let found: Option<Profile> = coll
            .find_one_as(&trellis_core::doc! { "username": "bob" })
            .await
            .unwrap();
        assert_eq!(found, Some(bob));

        let many: Vec<Profile> = coll.find_many_as(&in_filter("user_id", vec![1i64, 2])).await.unwrap();
        assert_eq!(many.len(), 2);
        assert_eq!(many[0], alice);

        let missing: Option<Profile> = coll.find_one_as(&id_filter(ObjectId::new())).await.unwrap();
        assert!(missing.is_none());
    }
}
