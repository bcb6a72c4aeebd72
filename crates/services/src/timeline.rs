//! Timeline storage shared by the user and home timelines
//!
//! A timeline is one [`Timeline`] document per user, appended to with
//! `$push`; the first append creates it in the same step. The cache holds the full entry list under the user id. Reads
//! return post ids newest first.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use trellis_core::{doc, Result};
use trellis_primitives::{Cache, CacheExt};
use trellis_storage::{CollectionExt, NoSqlCollection};

use crate::model::{PostInfo, Timeline};
use crate::repository::RepositoryStats;

/// How appends treat the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Edit the cached list only when one is present
    Lazy,
    /// Always leave the full list in the cache after an append
    WriteThrough,
}

pub(crate) struct TimelineStore {
    cache: Arc<dyn Cache>,
    timelines: Arc<dyn NoSqlCollection>,
    policy: CachePolicy,
    requests: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Post ids of `entries[start..stop]` counted from the newest entry
pub(crate) fn window(entries: &[PostInfo], start: i64, stop: i64) -> Vec<i64> {
    if stop <= start || start < 0 {
        return Vec::new();
    }
    entries
        .iter()
        .rev()
        .skip(start as usize)
        .take((stop - start) as usize)
        .map(|p| p.post_id)
        .collect()
}

impl TimelineStore {
    pub(crate) fn new(
        cache: Arc<dyn Cache>,
        timelines: Arc<dyn NoSqlCollection>,
        policy: CachePolicy,
    ) -> Self {
        TimelineStore {
            cache,
            timelines,
            policy,
            requests: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    async fn stored(&self, user_id: i64) -> Result<Vec<PostInfo>> {
        let timeline: Option<Timeline> = self
            .timelines
            .find_one_as(&doc! { "user_id": user_id })
            .await?;
        Ok(timeline.map(|t| t.posts).unwrap_or_default())
    }

    async fn cache_put(&self, user_id: i64, entries: &[PostInfo]) {
        if let Err(e) = self.cache.put_as(&user_id.to_string(), entries).await {
            warn!(target: "trellis::services", collection = self.timelines.name(), user_id, error = %e, "Timeline cache write failed");
        }
    }

    pub(crate) async fn append(&self, user_id: i64, entry: PostInfo) -> Result<()> {
        let update = doc! {
            "$push": { "posts": { "post_id": entry.post_id, "timestamp": entry.timestamp } },
        };
        let existed = self
            .timelines
            .update_or_insert(
                &doc! { "user_id": user_id },
                &update,
                doc! { "user_id": user_id, "posts": [] },
            )
            .await?;
        if !existed {
            debug!(target: "trellis::services", collection = self.timelines.name(), user_id, "Created timeline");
        }

        let cached = match self.cache.get_as::<Vec<PostInfo>>(&user_id.to_string()).await {
            Ok(cached) => cached,
            Err(e) => {
                warn!(target: "trellis::services", collection = self.timelines.name(), user_id, error = %e, "Timeline cache read failed");
                None
            }
        };
        match (cached, self.policy) {
            (Some(mut entries), _) => {
                entries.push(entry);
                self.cache_put(user_id, &entries).await;
            }
            (None, CachePolicy::WriteThrough) => {
                let entries = self.stored(user_id).await?;
                self.cache_put(user_id, &entries).await;
            }
            (None, CachePolicy::Lazy) => {}
        }
        Ok(())
    }

    pub(crate) async fn read(&self, user_id: i64, start: i64, stop: i64) -> Result<Vec<i64>> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if stop <= start || start < 0 {
            return Ok(Vec::new());
        }
        let key = user_id.to_string();
        let cached = match self.cache.get_as::<Vec<PostInfo>>(&key).await {
            Ok(cached) => cached,
            Err(e) => {
                warn!(target: "trellis::services", collection = self.timelines.name(), user_id, error = %e, "Timeline cache read failed; using store");
                None
            }
        };
        let entries = match cached {
            Some(entries) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                entries
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                let entries = self.stored(user_id).await?;
                if !entries.is_empty() {
                    self.cache_put(user_id, &entries).await;
                }
                entries
            }
        };
        Ok(window(&entries, start, stop))
    }

    pub(crate) async fn cleanup(&self) -> Result<()> {
        self.timelines.delete_many(&doc! {}).await?;
        self.cache.delete_all().await
    }

    pub(crate) fn stats(&self) -> RepositoryStats {
        RepositoryStats {
            requests: self.requests.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_primitives::MemoryCache;
    use trellis_storage::MemoryCollection;

    fn entries(ids: &[i64]) -> Vec<PostInfo> {
        ids.iter()
            .map(|&post_id| PostInfo {
                post_id,
                timestamp: post_id,
            })
            .collect()
    }

    #[test]
    fn test_window_newest_first() {
        let e = entries(&[1, 2, 3, 4]);
        assert_eq!(window(&e, 0, 2), vec![4, 3]);
        assert_eq!(window(&e, 1, 10), vec![3, 2, 1]);
        assert!(window(&e, 4, 10).is_empty());
        assert!(window(&e, 2, 2).is_empty());
        assert!(window(&e, -1, 3).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_appends_share_one_timeline() {
        for _ in 0..50 {
            let coll = Arc::new(MemoryCollection::new("home-timeline"));
            let store = Arc::new(TimelineStore::new(
                Arc::new(MemoryCache::new()),
                coll.clone(),
                CachePolicy::Lazy,
            ));

            let tasks: Vec<_> = [10, 11]
                .into_iter()
                .map(|post_id| {
                    let store = store.clone();
                    tokio::spawn(async move { store.append(1, entries(&[post_id])[0]).await })
                })
                .collect();
            for task in tasks {
                task.await.unwrap().unwrap();
            }

            assert_eq!(coll.len(), 1);
            let mut ids = store.read(1, 0, 10).await.unwrap();
            ids.sort_unstable();
            assert_eq!(ids, vec![10, 11]);
        }
    }

    #[tokio::test]
    async fn test_lazy_append_leaves_cache_cold() {
        let cache = Arc::new(MemoryCache::new());
        let coll = Arc::new(MemoryCollection::new("user-timeline"));
        let store = TimelineStore::new(cache.clone(), coll.clone(), CachePolicy::Lazy);

        store.append(1, entries(&[10])[0]).await.unwrap();
        store.append(1, entries(&[11])[0]).await.unwrap();
        assert_eq!(coll.len(), 1);
        assert!(cache.is_empty());

        assert_eq!(store.read(1, 0, 5).await.unwrap(), vec![11, 10]);
        assert_eq!(cache.len(), 1);
        store.append(1, entries(&[12])[0]).await.unwrap();
        assert_eq!(store.read(1, 0, 1).await.unwrap(), vec![12]);
        assert_eq!(store.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_write_through_fills_cache() {
        let cache = Arc::new(MemoryCache::new());
        let store = TimelineStore::new(
            cache.clone(),
            Arc::new(MemoryCollection::new("home-timeline")),
            CachePolicy::WriteThrough,
        );
        store.append(7, entries(&[1])[0]).await.unwrap();
        assert_eq!(
            cache.get_as::<Vec<PostInfo>>("7").await.unwrap(),
            Some(entries(&[1]))
        );

        cache.delete_all().await.unwrap();
        assert_eq!(store.read(7, 0, 5).await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_unknown_user_reads_empty() {
        let store = TimelineStore::new(
            Arc::new(MemoryCache::new()),
            Arc::new(MemoryCollection::new("user-timeline")),
            CachePolicy::Lazy,
        );
        assert!(store.read(99, 0, 10).await.unwrap().is_empty());
    }
}
