//! Store interfaces
//!
//! Repositories depend only on these traits, so an alternative backend can
//! be substituted for the in-memory engine as long as it honours the same
//! filter and update subset, including dotted paths and array broadcast.

use async_trait::async_trait;
use std::sync::Arc;
use trellis_core::{Document, ObjectId, Result, Value};

use crate::cursor::Cursor;

/// A set of databases, each holding named collections
#[async_trait]
pub trait NoSqlDatabase: Send + Sync {
    /// Open a collection, creating it on first use
    async fn collection(&self, database: &str, name: &str) -> Result<Arc<dyn NoSqlCollection>>;

    /// Drop a collection. Returns false if it did not exist.
    async fn drop_collection(&self, database: &str, name: &str) -> Result<bool>;

    /// Names of the collections in a database, sorted
    async fn collection_names(&self, database: &str) -> Result<Vec<String>>;
}

/// Collection-scoped document operations.
///
/// `filter` arguments are query documents (see [`crate::filter`]), `update`
/// arguments are update documents (see [`crate::update`]).
#[async_trait]
pub trait NoSqlCollection: Send + Sync {
    /// Collection name
    fn name(&self) -> &str;

    /// Insert a document, assigning an `_id` if absent. Returns the `_id`.
    async fn insert_one(&self, doc: Document) -> Result<Value>;

    /// Insert documents in order. Returns their `_id`s.
    async fn insert_many(&self, docs: Vec<Document>) -> Result<Vec<Value>>;

    /// First matching document in insertion order
    async fn find_one(&self, filter: &Document, projection: Option<&Document>) -> Result<Cursor>;

    /// Every matching document in insertion order
    async fn find_many(&self, filter: &Document, projection: Option<&Document>) -> Result<Cursor>;

    /// Update the first matching document. Returns the number updated.
    async fn update_one(&self, filter: &Document, update: &Document) -> Result<u64>;

    /// Update every matching document. Returns the number updated.
    async fn update_many(&self, filter: &Document, update: &Document) -> Result<u64>;

    /// Delete the first matching document. Returns the number deleted.
    async fn delete_one(&self, filter: &Document) -> Result<u64>;

    /// Delete every matching document. Returns the number deleted.
    async fn delete_many(&self, filter: &Document) -> Result<u64>;

    /// Replace the first matching document, keeping its `_id`
    async fn replace_one(&self, filter: &Document, replacement: Document) -> Result<u64>;

    /// Replace matching documents pairwise with `replacements`, in order
    async fn replace_many(&self, filter: &Document, replacements: Vec<Document>) -> Result<u64>;

    /// Replace the first matching document or insert `doc`.
    ///
    /// Returns true if an existing document was replaced.
    async fn upsert(&self, filter: &Document, doc: Document) -> Result<bool>;

    /// Apply `update` to the first matching document, or apply it to `seed`
    /// and insert the result. Match and insert happen as one step.
    ///
    /// Returns true if an existing document was updated.
    async fn update_or_insert(
        &self,
        filter: &Document,
        update: &Document,
        seed: Document,
    ) -> Result<bool>;

    /// Replace the document with this `_id` or insert `doc` with it.
    ///
    /// Returns true if an existing document was replaced.
    async fn upsert_by_id(&self, id: ObjectId, doc: Document) -> Result<bool>;

    /// Number of matching documents
    async fn count(&self, filter: &Document) -> Result<u64>;
}
