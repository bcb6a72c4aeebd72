//! Cache-aside repository
//!
//! A [`Repository`] pairs a cache with a collection for one entity type.
//!
//! - Reads consult the cache first. On a miss they fall through to the
//!   collection and populate the cache with what they found.
//! - `write` is write-around and leaves the cache alone.
//! - `write_through` updates both.
//!
//! The store is authoritative. Cache failures on the read path are logged
//! and treated as misses; cache failures while populating are logged and
//! swallowed.

use futures::future::join_all;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use trellis_core::{to_document, Document, Error, Result, Value};
use trellis_primitives::{Cache, CacheExt};
use trellis_storage::{in_filter, CollectionExt, NoSqlCollection};

/// An entity stored by key in a collection and a cache
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Document field holding the key
    const KEY_FIELD: &'static str;

    /// Key type; its `Display` form is the cache key
    type Key: Clone + Eq + Hash + fmt::Display + Into<Value> + Send + Sync;

    /// Key of this entity
    fn key(&self) -> Self::Key;
}

/// Read counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepositoryStats {
    /// Read calls
    pub requests: u64,
    /// Keys served from the cache
    pub hits: u64,
    /// Keys that fell through to the store
    pub misses: u64,
}

#[derive(Default)]
struct Counters {
    requests: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Cache-aside access to one entity type
pub struct Repository<T: Entity> {
    cache: Arc<dyn Cache>,
    collection: Arc<dyn NoSqlCollection>,
    counters: Counters,
    _entity: std::marker::PhantomData<fn() -> T>,
}

impl<T: Entity> Repository<T> {
    /// Pair a cache with a collection
    pub fn new(cache: Arc<dyn Cache>, collection: Arc<dyn NoSqlCollection>) -> Self {
        Repository {
            cache,
            collection,
            counters: Counters::default(),
            _entity: std::marker::PhantomData,
        }
    }

    /// The backing collection
    pub fn collection(&self) -> &Arc<dyn NoSqlCollection> {
        &self.collection
    }

    /// The backing cache
    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }

    fn key_filter(key: &T::Key) -> Document {
        let mut filter = Document::new();
        filter.insert(T::KEY_FIELD, key.clone());
        filter
    }

    async fn populate(&self, entity: &T) {
        let key = entity.key().to_string();
        if let Err(e) = self.cache.put_as(&key, entity).await {
            warn!(target: "trellis::services", collection = self.collection.name(), key = %key, error = %e, "Cache populate failed");
        }
    }

    /// Read one entity.
    ///
    /// # Errors
    ///
    /// `NotFound` if neither the cache nor the store holds `key`.
    pub async fn read(&self, key: &T::Key) -> Result<T> {
        self.counters.requests.fetch_add(1, Ordering::Relaxed);
        let cache_key = key.to_string();
        match self.cache.get_as::<T>(&cache_key).await {
            Ok(Some(entity)) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(entity);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(target: "trellis::services", collection = self.collection.name(), key = %cache_key, error = %e, "Cache read failed; using store");
            }
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);

        let entity: T = self
            .collection
            .find_one_as(&Self::key_filter(key))
            .await?
            .ok_or_else(|| {
                Error::not_found(format!("{} {}={}", self.collection.name(), T::KEY_FIELD, key))
            })?;
        self.populate(&entity).await;
        Ok(entity)
    }

    /// Read every entity found for `keys`, in key order.
    ///
    /// Duplicate keys are read once. Keys found nowhere are skipped.
    pub async fn read_many(&self, keys: &[T::Key]) -> Result<Vec<T>> {
        self.counters.requests.fetch_add(1, Ordering::Relaxed);
        let mut seen = FxHashSet::default();
        let unique: Vec<T::Key> = keys.iter().filter(|k| seen.insert(*k)).cloned().collect();
        if unique.is_empty() {
            return Ok(Vec::new());
        }

        let cache_keys: Vec<String> = unique.iter().map(|k| k.to_string()).collect();
        let cached = match self.cache.mget_as::<T>(&cache_keys).await {
            Ok(values) => values,
            Err(e) => {
                warn!(target: "trellis::services", collection = self.collection.name(), error = %e, "Cache mget failed; using store");
                vec![None; unique.len()]
            }
        };

        let mut found: FxHashMap<T::Key, T> = FxHashMap::default();
        let mut misses = Vec::new();
        for (key, value) in unique.iter().zip(cached) {
            match value {
                Some(entity) => {
                    found.insert(key.clone(), entity);
                }
                None => misses.push(key.clone()),
            }
        }
        self.counters
            .hits
            .fetch_add(found.len() as u64, Ordering::Relaxed);
        self.counters
            .misses
            .fetch_add(misses.len() as u64, Ordering::Relaxed);

        if !misses.is_empty() {
            debug!(target: "trellis::services", collection = self.collection.name(), misses = misses.len(), "Reading misses from store");
            let extra: Vec<T> = self
                .collection
                .find_many_as(&in_filter(T::KEY_FIELD, misses))
                .await?;
            join_all(extra.iter().map(|entity| self.populate(entity))).await;
            for entity in extra {
                found.insert(entity.key(), entity);
            }
        }

        Ok(unique.iter().filter_map(|k| found.remove(k)).collect())
    }

    /// Insert into the store only
    pub async fn write(&self, entity: &T) -> Result<()> {
        self.collection.insert(entity).await?;
        Ok(())
    }

    /// Replace-or-insert in the store, then refresh the cache
    pub async fn write_through(&self, entity: &T) -> Result<()> {
        let doc = to_document(entity)?;
        self.collection
            .upsert(&Self::key_filter(&entity.key()), doc)
            .await?;
        self.populate(entity).await;
        Ok(())
    }

    /// Drop the cached copy of `key`
    pub async fn invalidate(&self, key: &T::Key) -> Result<()> {
        self.cache.delete(&key.to_string()).await
    }

    /// Empty both the collection and the cache
    pub async fn cleanup(&self) -> Result<()> {
        self.collection.delete_many(&Document::new()).await?;
        self.cache.delete_all().await
    }

    /// Read counters so far
    pub fn stats(&self) -> RepositoryStats {
        RepositoryStats {
            requests: self.counters.requests.load(Ordering::Relaxed),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
        }
    }
}
