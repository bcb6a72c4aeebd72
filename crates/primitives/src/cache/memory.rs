use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::trace;
use trellis_core::{Error, Result};

use super::{decode, encode, Cache};

/// In-process [`Cache`] over a sharded concurrent map.
///
/// Entries never expire; `evict` simulates an external eviction.
pub struct MemoryCache {
    data: DashMap<String, Vec<u8>>,
}

impl MemoryCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the cache holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Drop a key as an eviction policy would. Returns true if it existed.
    pub fn evict(&self, key: &str) -> bool {
        self.data.remove(key).is_some()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        trace!(target: "trellis::cache", key, bytes = value.len(), "put");
        self.data.insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let hit = self.data.get(key).map(|r| r.value().clone());
        trace!(target: "trellis::cache", key, hit = hit.is_some(), "get");
        Ok(hit)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.data.remove(key);
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        match self.data.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let current: i64 = decode(entry.get())?;
                let next = current
                    .checked_add(1)
                    .ok_or_else(|| Error::cache(format!("incr overflows at {}", key)))?;
                entry.insert(encode(&next)?);
                Ok(next)
            }
            Entry::Vacant(entry) => {
                entry.insert(encode(&1i64)?);
                Ok(1)
            }
        }
    }

    async fn delete_all(&self) -> Result<()> {
        self.data.clear();
        Ok(())
    }
}
