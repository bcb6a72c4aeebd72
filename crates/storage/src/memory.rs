//! In-memory document engine
//!
//! ## Design
//!
//! Each collection is an append-ordered `Vec<Document>` behind a single
//! `parking_lot::Mutex`, so every operation on a collection is serialized.
//! Filters, updates and projections are parsed before the lock is taken;
//! a malformed query never holds the lock.
//!
//! Updates are computed on clones and installed only once every matching
//! document has been updated successfully, so a failing `update_many`
//! leaves the collection untouched.
//!
//! ## Thread Safety
//!
//! `MemoryDatabase` and `MemoryCollection` are `Send + Sync`. Collections
//! are shared through `Arc`: two `collection()` calls with the same names
//! return the same collection.

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::debug;
use trellis_core::{Document, Error, ObjectId, Result, Value, ID_FIELD};

use crate::cursor::Cursor;
use crate::filter::{parse_filter, Filter};
use crate::projection::Projection;
use crate::traits::{NoSqlCollection, NoSqlDatabase};
use crate::update::{check_replacement, parse_update};

/// In-process [`NoSqlDatabase`]
#[derive(Default)]
pub struct MemoryDatabase {
    collections: Mutex<FxHashMap<(String, String), Arc<MemoryCollection>>>,
}

impl MemoryDatabase {
    /// Create an empty database set
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a collection with its concrete type
    pub fn memory_collection(&self, database: &str, name: &str) -> Arc<MemoryCollection> {
        let mut collections = self.collections.lock();
        collections
            .entry((database.to_string(), name.to_string()))
            .or_insert_with(|| {
                debug!(target: "trellis::storage", database, collection = name, "Collection created");
                Arc::new(MemoryCollection::new(name))
            })
            .clone()
    }
}

#[async_trait]
impl NoSqlDatabase for MemoryDatabase {
    async fn collection(&self, database: &str, name: &str) -> Result<Arc<dyn NoSqlCollection>> {
        Ok(self.memory_collection(database, name))
    }

    async fn drop_collection(&self, database: &str, name: &str) -> Result<bool> {
        let removed = self
            .collections
            .lock()
            .remove(&(database.to_string(), name.to_string()))
            .is_some();
        if removed {
            debug!(target: "trellis::storage", database, collection = name, "Collection dropped");
        }
        Ok(removed)
    }

    async fn collection_names(&self, database: &str) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .collections
            .lock()
            .keys()
            .filter(|(db, _)| db == database)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }
}

/// In-process [`NoSqlCollection`]
pub struct MemoryCollection {
    name: String,
    docs: Mutex<Vec<Document>>,
}

impl MemoryCollection {
    /// Create an empty collection
    pub fn new(name: impl Into<String>) -> Self {
        MemoryCollection {
            name: name.into(),
            docs: Mutex::new(Vec::new()),
        }
    }

    /// Number of stored documents
    pub fn len(&self) -> usize {
        self.docs.lock().len()
    }

    /// True if the collection holds no documents
    pub fn is_empty(&self) -> bool {
        self.docs.lock().is_empty()
    }

    /// Snapshot of every stored document in insertion order
    pub fn snapshot(&self) -> Vec<Document> {
        self.docs.lock().clone()
    }

    fn find(&self, filter: &Document, projection: Option<&Document>, limit: usize) -> Result<Cursor> {
        let filter = parse_filter(filter)?;
        let projection = projection.map(Projection::parse).transpose()?;
        let docs = self.docs.lock();
        let found = docs
            .iter()
            .filter(|d| filter.matches(d))
            .take(limit)
            .map(|d| match &projection {
                Some(p) => p.apply(d),
                None => d.clone(),
            })
            .collect();
        Ok(Cursor::new(found))
    }

    fn update(&self, filter: &Document, update: &Document, limit: usize) -> Result<u64> {
        let filter = parse_filter(filter)?;
        let update = parse_update(update)?;
        let mut docs = self.docs.lock();

        let mut updated = Vec::new();
        for (pos, doc) in docs.iter().enumerate() {
            if updated.len() == limit {
                break;
            }
            if filter.matches(doc) {
                updated.push((pos, update.apply_to(doc)?));
            }
        }

        let count = updated.len() as u64;
        for (pos, doc) in updated {
            docs[pos] = doc;
        }
        debug!(target: "trellis::storage", collection = %self.name, count, "Documents updated");
        Ok(count)
    }

    fn delete(&self, filter: &Document, limit: usize) -> Result<u64> {
        let filter = parse_filter(filter)?;
        let mut docs = self.docs.lock();
        let mut deleted = 0usize;
        docs.retain(|d| {
            if deleted < limit && filter.matches(d) {
                deleted += 1;
                false
            } else {
                true
            }
        });
        debug!(target: "trellis::storage", collection = %self.name, count = deleted, "Documents deleted");
        Ok(deleted as u64)
    }

    fn replace_matching(
        docs: &mut [Document],
        filter: &Filter,
        replacements: Vec<Document>,
    ) -> Result<u64> {
        let positions: Vec<usize> = docs
            .iter()
            .enumerate()
            .filter(|(_, d)| filter.matches(d))
            .map(|(pos, _)| pos)
            .take(replacements.len())
            .collect();

        let mut staged = Vec::with_capacity(positions.len());
        for (pos, replacement) in positions.into_iter().zip(replacements) {
            staged.push((pos, with_existing_id(&docs[pos], replacement)?));
        }
        let count = staged.len() as u64;
        for (pos, doc) in staged {
            docs[pos] = doc;
        }
        Ok(count)
    }
}

/// Carry the stored `_id` over to a replacement document
fn with_existing_id(existing: &Document, mut replacement: Document) -> Result<Document> {
    check_replacement(&replacement)?;
    match (existing.get(ID_FIELD), replacement.get(ID_FIELD)) {
        (Some(old), Some(new)) if old != new => Err(Error::bad_query("_id is immutable")),
        (Some(old), _) => {
            let old = old.clone();
            replacement.insert_front(ID_FIELD, old);
            Ok(replacement)
        }
        (None, _) => Ok(replacement),
    }
}

#[async_trait]
impl NoSqlCollection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert_one(&self, mut doc: Document) -> Result<Value> {
        check_replacement(&doc)?;
        let id = doc.ensure_id();
        self.docs.lock().push(doc);
        debug!(target: "trellis::storage", collection = %self.name, "Document inserted");
        Ok(id)
    }

    async fn insert_many(&self, docs: Vec<Document>) -> Result<Vec<Value>> {
        let mut prepared = Vec::with_capacity(docs.len());
        let mut ids = Vec::with_capacity(docs.len());
        for mut doc in docs {
            check_replacement(&doc)?;
            ids.push(doc.ensure_id());
            prepared.push(doc);
        }
        let count = prepared.len();
        self.docs.lock().extend(prepared);
        debug!(target: "trellis::storage", collection = %self.name, count, "Documents inserted");
        Ok(ids)
    }

    async fn find_one(&self, filter: &Document, projection: Option<&Document>) -> Result<Cursor> {
        self.find(filter, projection, 1)
    }

    async fn find_many(&self, filter: &Document, projection: Option<&Document>) -> Result<Cursor> {
        self.find(filter, projection, usize::MAX)
    }

    async fn update_one(&self, filter: &Document, update: &Document) -> Result<u64> {
        self.update(filter, update, 1)
    }

    async fn update_many(&self, filter: &Document, update: &Document) -> Result<u64> {
        self.update(filter, update, usize::MAX)
    }

    async fn delete_one(&self, filter: &Document) -> Result<u64> {
        self.delete(filter, 1)
    }

    async fn delete_many(&self, filter: &Document) -> Result<u64> {
        self.delete(filter, usize::MAX)
    }

    async fn replace_one(&self, filter: &Document, replacement: Document) -> Result<u64> {
        let filter = parse_filter(filter)?;
        let mut docs = self.docs.lock();
        Self::replace_matching(&mut docs, &filter, vec![replacement])
    }

    async fn replace_many(&self, filter: &Document, replacements: Vec<Document>) -> Result<u64> {
        let filter = parse_filter(filter)?;
        let mut docs = self.docs.lock();
        Self::replace_matching(&mut docs, &filter, replacements)
    }

    async fn upsert(&self, filter: &Document, mut doc: Document) -> Result<bool> {
        let filter = parse_filter(filter)?;
        let mut docs = self.docs.lock();
        match docs.iter().position(|d| filter.matches(d)) {
            Some(pos) => {
                let replaced = with_existing_id(&docs[pos], doc)?;
                docs[pos] = replaced;
                Ok(true)
            }
            None => {
                check_replacement(&doc)?;
                doc.ensure_id();
                docs.push(doc);
                Ok(false)
            }
        }
    }

    async fn update_or_insert(
        &self,
        filter: &Document,
        update: &Document,
        seed: Document,
    ) -> Result<bool> {
        let filter = parse_filter(filter)?;
        let update = parse_update(update)?;
        let mut docs = self.docs.lock();
        match docs.iter().position(|d| filter.matches(d)) {
            Some(pos) => {
                docs[pos] = update.apply_to(&docs[pos])?;
                Ok(true)
            }
            None => {
                check_replacement(&seed)?;
                let mut doc = update.apply_to(&seed)?;
                doc.ensure_id();
                debug!(target: "trellis::storage", collection = %self.name, "Seed document inserted");
                docs.push(doc);
                Ok(false)
            }
        }
    }

    async fn upsert_by_id(&self, id: ObjectId, mut doc: Document) -> Result<bool> {
        check_replacement(&doc)?;
        let id = Value::ObjectId(id);
        if doc.get(ID_FIELD).map(|existing| existing != &id).unwrap_or(false) {
            return Err(Error::bad_query("_id is immutable"));
        }
        doc.insert_front(ID_FIELD, id.clone());

        let mut docs = self.docs.lock();
        match docs.iter().position(|d| d.get(ID_FIELD) == Some(&id)) {
            Some(pos) => {
                docs[pos] = doc;
                Ok(true)
            }
            None => {
                docs.push(doc);
                Ok(false)
            }
        }
    }

    async fn count(&self, filter: &Document) -> Result<u64> {
        let filter = parse_filter(filter)?;
        Ok(self.docs.lock().iter().filter(|d| filter.matches(d)).count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::doc;

    fn ratings() -> MemoryCollection {
        MemoryCollection::new("ratings")
    }

    #[tokio::test]
    async fn test_insert_assigns_id_first() {
        let c = ratings();
        let id = c.insert_one(doc! { "type": "A" }).await.unwrap();
        assert!(matches!(id, Value::ObjectId(_)));
        let stored = c.snapshot();
        assert_eq!(stored[0].keys().next(), Some(ID_FIELD));
        assert_eq!(stored[0].get(ID_FIELD), Some(&id));
    }

    #[tokio::test]
    async fn test_insert_keeps_caller_id() {
        let c = ratings();
        let id = c.insert_one(doc! { "_id": 42, "type": "A" }).await.unwrap();
        assert_eq!(id, Value::Int32(42));
    }

    #[tokio::test]
    async fn test_find_never_mutates() {
        let c = ratings();
        c.insert_many(vec![doc! { "a": 1 }, doc! { "a": 2 }]).await.unwrap();
        let before = c.snapshot();
        c.find_many(&doc! { "a": { "$gt": 0 } }, Some(&doc! { "a": 0 }))
            .await
            .unwrap();
        assert_eq!(c.snapshot(), before);
    }

    #[tokio::test]
    async fn test_find_one_returns_first_in_insertion_order() {
        let c = ratings();
        c.insert_many(vec![doc! { "n": 1, "k": "x" }, doc! { "n": 2, "k": "x" }])
            .await
            .unwrap();
        let cursor = c.find_one(&doc! { "k": "x" }, None).await.unwrap();
        assert_eq!(cursor.len(), 1);
        assert_eq!(cursor.documents()[0].get("n"), Some(&Value::Int32(1)));
    }

    #[tokio::test]
    async fn test_update_many_is_all_or_nothing() {
        let c = ratings();
        c.insert_many(vec![doc! { "n": 1 }, doc! { "n": "two" }]).await.unwrap();
        let err = c.update_many(&doc! {}, &doc! { "$inc": { "n": 1 } }).await.unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
        assert_eq!(c.snapshot()[0].get("n"), Some(&Value::Int32(1)));
    }

    #[tokio::test]
    async fn test_update_one_touches_first_match_only() {
        let c = ratings();
        c.insert_many(vec![doc! { "n": 1 }, doc! { "n": 1 }]).await.unwrap();
        let count = c.update_one(&doc! { "n": 1 }, &doc! { "$set": { "n": 5 } }).await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(c.count(&doc! { "n": 5 }).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_preserves_order() {
        let c = ratings();
        c.insert_many(vec![doc! { "n": 1 }, doc! { "n": 2 }, doc! { "n": 3 }, doc! { "n": 4 }])
            .await
            .unwrap();
        assert_eq!(c.delete_many(&doc! { "n": { "$in": [1, 3] } }).await.unwrap(), 2);
        let left: Vec<i64> = c
            .snapshot()
            .iter()
            .filter_map(|d| d.get("n").and_then(Value::as_i64))
            .collect();
        assert_eq!(left, vec![2, 4]);
        assert_eq!(c.delete_one(&doc! {}).await.unwrap(), 1);
        assert_eq!(c.len(), 1);
    }

    #[tokio::test]
    async fn test_replace_keeps_id_and_position() {
        let c = ratings();
        c.insert_many(vec![doc! { "n": 1 }, doc! { "n": 2 }]).await.unwrap();
        let id = c.snapshot()[0].get(ID_FIELD).cloned().unwrap();
        let count = c.replace_one(&doc! { "n": 1 }, doc! { "n": 10 }).await.unwrap();
        assert_eq!(count, 1);
        let docs = c.snapshot();
        assert_eq!(docs[0].get(ID_FIELD), Some(&id));
        assert_eq!(docs[0].get("n"), Some(&Value::Int32(10)));
    }

    #[tokio::test]
    async fn test_replace_cannot_change_id() {
        let c = ratings();
        c.insert_one(doc! { "n": 1 }).await.unwrap();
        let err = c
            .replace_one(&doc! {}, doc! { "_id": 5, "n": 2 })
            .await
            .unwrap_err();
        assert!(err.is_bad_query());
    }

    #[tokio::test]
    async fn test_replace_many_pairs_in_order() {
        let c = ratings();
        c.insert_many(vec![doc! { "k": 1 }, doc! { "k": 0 }, doc! { "k": 1 }])
            .await
            .unwrap();
        let count = c
            .replace_many(&doc! { "k": 1 }, vec![doc! { "v": "a" }, doc! { "v": "b" }, doc! { "v": "c" }])
            .await
            .unwrap();
        assert_eq!(count, 2);
        let docs = c.snapshot();
        assert_eq!(docs[0].get("v"), Some(&Value::from("a")));
        assert_eq!(docs[2].get("v"), Some(&Value::from("b")));
    }

    #[tokio::test]
    async fn test_upsert() {
        let c = ratings();
        assert!(!c.upsert(&doc! { "k": 1 }, doc! { "k": 1, "v": 1 }).await.unwrap());
        assert!(c.upsert(&doc! { "k": 1 }, doc! { "k": 1, "v": 2 }).await.unwrap());
        assert_eq!(c.len(), 1);
        assert_eq!(c.snapshot()[0].get("v"), Some(&Value::Int32(2)));
    }

    #[tokio::test]
    async fn test_update_or_insert_seeds_then_updates() {
        let c = ratings();
        let push = doc! { "$push": { "posts": 1 } };
        assert!(!c
            .update_or_insert(&doc! { "k": 1 }, &push, doc! { "k": 1, "posts": [] })
            .await
            .unwrap());
        assert!(c
            .update_or_insert(&doc! { "k": 1 }, &push, doc! { "k": 1, "posts": [] })
            .await
            .unwrap());

        let docs = c.snapshot();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].id().is_some());
        assert_eq!(
            docs[0].get("posts"),
            Some(&Value::Array(vec![Value::Int32(1), Value::Int32(1)]))
        );

        let err = c
            .update_or_insert(&doc! { "k": 2 }, &push, doc! { "$set": { "k": 2 } })
            .await
            .unwrap_err();
        assert!(err.is_bad_query());
        assert_eq!(c.len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_by_id_replaces_in_place() {
        let c = ratings();
        let id = ObjectId::new();
        c.insert_one(doc! { "n": 0 }).await.unwrap();
        assert!(!c.upsert_by_id(id, doc! { "n": 1 }).await.unwrap());
        c.insert_one(doc! { "n": 2 }).await.unwrap();
        assert!(c.upsert_by_id(id, doc! { "n": 11 }).await.unwrap());

        let docs = c.snapshot();
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[1].id(), Some(id));
        assert_eq!(docs[1].get("n"), Some(&Value::Int32(11)));
    }

    #[tokio::test]
    async fn test_bad_query_propagates() {
        let c = ratings();
        let err = c
            .find_many(&doc! { "a": { "$bogus": 1 } }, None)
            .await
            .unwrap_err();
        assert!(err.is_bad_query());
    }

    #[tokio::test]
    async fn test_database_shares_collections() {
        let db = MemoryDatabase::new();
        let a = db.collection("social", "posts").await.unwrap();
        a.insert_one(doc! { "x": 1 }).await.unwrap();
        let b = db.collection("social", "posts").await.unwrap();
        assert_eq!(b.count(&doc! {}).await.unwrap(), 1);

        db.collection("social", "graph").await.unwrap();
        db.collection("other", "posts").await.unwrap();
        assert_eq!(
            db.collection_names("social").await.unwrap(),
            vec!["graph".to_string(), "posts".to_string()]
        );

        assert!(db.drop_collection("social", "posts").await.unwrap());
        assert!(!db.drop_collection("social", "posts").await.unwrap());
        let fresh = db.collection("social", "posts").await.unwrap();
        assert_eq!(fresh.count(&doc! {}).await.unwrap(), 0);
    }
}
