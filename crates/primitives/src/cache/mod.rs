//! Cache: key → opaque bytes
//!
//! ## Design
//!
//! [`Cache`] is the backend contract. Values are opaque to the backend;
//! [`CacheExt`] layers typed access on top, encoding with MessagePack
//! (`rmp_serde::to_vec_named`, so struct field names survive and any value
//! shape the document engine supports round-trips).
//!
//! ## Semantics
//!
//! - `get` on a miss is `Ok(None)`, never an error
//! - `mget` returns one slot per key, `None` for misses, so a present zero
//!   value is distinguishable from an absent key
//! - `incr` treats an absent key as zero and returns the new value
//! - multi-key operations are not atomic across keys
//!
//! Backend failures surface as [`Error::Cache`]; repositories log them and
//! fall through to the store.

mod memory;

pub use memory::MemoryCache;

use async_trait::async_trait;
use futures::future::try_join_all;
use serde::de::DeserializeOwned;
use serde::Serialize;
use trellis_core::{Error, Result};

/// Cache backend
#[async_trait]
pub trait Cache: Send + Sync {
    /// Store a value, overwriting any previous one
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Fetch a value. A miss is `Ok(None)`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Remove a key. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Increment the integer stored at `key` and return the new value
    async fn incr(&self, key: &str) -> Result<i64>;

    /// Remove every key
    async fn delete_all(&self) -> Result<()>;

    /// Store several values. The default fans out to `put` concurrently.
    async fn mset(&self, keys: &[String], values: Vec<Vec<u8>>) -> Result<()> {
        check_lengths(keys.len(), values.len())?;
        try_join_all(
            keys.iter()
                .zip(values)
                .map(|(key, value)| self.put(key, value)),
        )
        .await?;
        Ok(())
    }

    /// Fetch several values, one slot per key
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        try_join_all(keys.iter().map(|key| self.get(key))).await
    }
}

fn check_lengths(keys: usize, values: usize) -> Result<()> {
    if keys != values {
        return Err(Error::invalid_argument(format!(
            "mset got {} keys and {} values",
            keys, values
        )));
    }
    Ok(())
}

/// Encode a value the way every typed cache helper does
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    rmp_serde::to_vec_named(value).map_err(|e| Error::cache(format!("encode: {}", e)))
}

/// Decode a value written by [`encode`]
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    rmp_serde::from_slice(bytes).map_err(|e| Error::cache(format!("decode: {}", e)))
}

/// Typed helpers, implemented for every [`Cache`]
#[async_trait]
pub trait CacheExt: Cache {
    /// Encode and store a value
    async fn put_as<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize + Sync + ?Sized,
    {
        let bytes = encode(value)?;
        self.put(key, bytes).await
    }

    /// Fetch and decode a value
    async fn get_as<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(key).await? {
            Some(bytes) => decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Encode and store several values
    async fn mset_as<T>(&self, keys: &[String], values: &[T]) -> Result<()>
    where
        T: Serialize + Sync,
    {
        check_lengths(keys.len(), values.len())?;
        let encoded = values.iter().map(encode).collect::<Result<Vec<_>>>()?;
        self.mset(keys, encoded).await
    }

    /// Fetch and decode several values, `None` for each miss
    async fn mget_as<T>(&self, keys: &[String]) -> Result<Vec<Option<T>>>
    where
        T: DeserializeOwned + Send,
    {
        self.mget(keys)
            .await?
            .into_iter()
            .map(|slot| slot.map(|bytes| decode(&bytes)).transpose())
            .collect()
    }
}

impl<C: Cache + ?Sized> CacheExt for C {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::Arc;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Creator {
        user_id: i64,
        username: String,
    }

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
        let creator = Creator {
            user_id: 1,
            username: "u1".into(),
        };
        cache.put_as("1", &creator).await.unwrap();
        assert_eq!(cache.get_as::<Creator>("1").await.unwrap(), Some(creator));

        cache.delete("1").await.unwrap();
        assert_eq!(cache.get_as::<Creator>("1").await.unwrap(), None);
        cache.delete("1").await.unwrap();
    }

    #[tokio::test]
    async fn test_mget_distinguishes_zero_from_missing() {
        let cache = MemoryCache::new();
        cache
            .mset_as(&keys(&["a", "b"]), &[0i64, 7])
            .await
            .unwrap();
        let got: Vec<Option<i64>> = cache.mget_as(&keys(&["a", "missing", "b"])).await.unwrap();
        assert_eq!(got, vec![Some(0), None, Some(7)]);
    }

    #[tokio::test]
    async fn test_mset_length_mismatch() {
        let cache = MemoryCache::new();
        let err = cache.mset_as(&keys(&["a", "b"]), &[1i64]).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_decode_failure_is_cache_error() {
        let cache = MemoryCache::new();
        cache.put("k", vec![0xc1]).await.unwrap();
        let err = cache.get_as::<Creator>("k").await.unwrap_err();
        assert!(err.is_cache());
    }

    #[tokio::test]
    async fn test_incr_interoperates_with_typed_get() {
        let cache = MemoryCache::new();
        assert_eq!(cache.incr("n").await.unwrap(), 1);
        assert_eq!(cache.incr("n").await.unwrap(), 2);
        assert_eq!(cache.get_as::<i64>("n").await.unwrap(), Some(2));

        cache.put_as("m", &41i64).await.unwrap();
        assert_eq!(cache.incr("m").await.unwrap(), 42);
    }
}
