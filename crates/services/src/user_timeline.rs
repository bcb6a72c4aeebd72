//! Posts written by each user

use std::sync::Arc;
use trellis_core::Result;
use trellis_primitives::Cache;
use trellis_storage::NoSqlCollection;

use crate::model::PostInfo;
use crate::post_storage::PostStorageService;
use crate::repository::RepositoryStats;
use crate::timeline::{CachePolicy, TimelineStore};

/// Author timelines, cached lazily on read
pub struct UserTimelineService {
    store: TimelineStore,
    posts: Arc<PostStorageService>,
}

impl UserTimelineService {
    /// Service over the user-timeline cache and collection
    pub fn new(
        cache: Arc<dyn Cache>,
        timelines: Arc<dyn NoSqlCollection>,
        posts: Arc<PostStorageService>,
    ) -> Self {
        UserTimelineService {
            store: TimelineStore::new(cache, timelines, CachePolicy::Lazy),
            posts,
        }
    }

    /// Append `post_id` to the timeline of `user_id`
    pub async fn write_user_timeline(&self, post_id: i64, user_id: i64, timestamp: i64) -> Result<()> {
        self.store
            .append(user_id, PostInfo { post_id, timestamp })
            .await
    }

    /// Post ids `[start, stop)` of `user_id`'s timeline, newest first.
    ///
    /// The posts themselves are read through the post store so they are
    /// cached for the caller's next step. An unknown user has an empty
    /// timeline.
    pub async fn read_user_timeline(&self, user_id: i64, start: i64, stop: i64) -> Result<Vec<i64>> {
        let ids = self.store.read(user_id, start, stop).await?;
        if !ids.is_empty() {
            self.posts.read_posts(&ids).await?;
        }
        Ok(ids)
    }

    /// Empty the timeline collection and cache
    pub async fn cleanup(&self) -> Result<()> {
        self.store.cleanup().await
    }

    /// Cache counters for reads
    pub fn stats(&self) -> RepositoryStats {
        self.store.stats()
    }
}
