//! Posts delivered to each user's home feed

use futures::future::join_all;
use rustc_hash::FxHashSet;
use std::sync::Arc;
use tracing::debug;
use trellis_core::Result;
use trellis_primitives::Cache;
use trellis_storage::NoSqlCollection;

use crate::model::PostInfo;
use crate::post_storage::PostStorageService;
use crate::social_graph::SocialGraphService;
use crate::timeline::{CachePolicy, TimelineStore};

/// Home feeds, kept in the cache on every write
pub struct HomeTimelineService {
    store: TimelineStore,
    posts: Arc<PostStorageService>,
    social_graph: Arc<SocialGraphService>,
}

impl HomeTimelineService {
    /// Service over the home-timeline cache and collection
    pub fn new(
        cache: Arc<dyn Cache>,
        timelines: Arc<dyn NoSqlCollection>,
        posts: Arc<PostStorageService>,
        social_graph: Arc<SocialGraphService>,
    ) -> Self {
        HomeTimelineService {
            store: TimelineStore::new(cache, timelines, CachePolicy::WriteThrough),
            posts,
            social_graph,
        }
    }

    /// Deliver `post_id` to every follower of `user_id` and every
    /// mentioned user. Each recipient gets the post once.
    pub async fn write_home_timeline(
        &self,
        post_id: i64,
        user_id: i64,
        timestamp: i64,
        user_mention_ids: &[i64],
    ) -> Result<()> {
        let followers = self.social_graph.get_followers(user_id).await?;
        let mut seen = FxHashSet::default();
        let recipients: Vec<i64> = followers
            .into_iter()
            .chain(user_mention_ids.iter().copied())
            .filter(|id| seen.insert(*id))
            .collect();
        debug!(target: "trellis::services", post_id, recipients = recipients.len(), "Fanning out to home timelines");

        let entry = PostInfo { post_id, timestamp };
        join_all(recipients.iter().map(|&id| self.store.append(id, entry)))
            .await
            .into_iter()
            .collect()
    }

    /// Post ids `[start, stop)` of `user_id`'s home feed, newest first
    pub async fn read_home_timeline(&self, user_id: i64, start: i64, stop: i64) -> Result<Vec<i64>> {
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
}
