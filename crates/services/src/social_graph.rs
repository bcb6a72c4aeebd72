//! Follow graph
//!
//! Each user has one [`GraphNode`] document holding both adjacency lists.
//! The lists are mirrored in the cache under `"{id}:followers"` and
//! `"{id}:followees"`; a cached list is only edited in place when it is
//! already present, otherwise the next read loads it from the store.

use std::sync::Arc;
use tracing::{debug, warn};
use trellis_core::{doc, Error, Result};
use trellis_primitives::{Cache, CacheExt};
use trellis_storage::{CollectionExt, NoSqlCollection};

use crate::model::{Edge, GraphNode};
use crate::user_id::UserIdService;

#[derive(Debug, Clone, Copy)]
enum Side {
    Followers,
    Followees,
}

impl Side {
    fn field(self) -> &'static str {
        match self {
            Side::Followers => "followers",
            Side::Followees => "followees",
        }
    }

    fn cache_key(self, user_id: i64) -> String {
        format!("{}:{}", user_id, self.field())
    }
}

/// Follower/followee lists backed by the `social-graph` collection
pub struct SocialGraphService {
    cache: Arc<dyn Cache>,
    graph: Arc<dyn NoSqlCollection>,
    user_ids: Arc<UserIdService>,
}

impl SocialGraphService {
    /// Service over the graph cache and collection
    pub fn new(
        cache: Arc<dyn Cache>,
        graph: Arc<dyn NoSqlCollection>,
        user_ids: Arc<UserIdService>,
    ) -> Self {
        SocialGraphService {
            cache,
            graph,
            user_ids,
        }
    }

    async fn edges(&self, user_id: i64, side: Side) -> Result<Vec<Edge>> {
        let key = side.cache_key(user_id);
        match self.cache.get_as::<Vec<Edge>>(&key).await {
            Ok(Some(edges)) => return Ok(edges),
            Ok(None) => {}
            Err(e) => {
                warn!(target: "trellis::services", key = %key, error = %e, "Graph cache read failed; using store");
            }
        }

        let node: GraphNode = self
            .graph
            .find_one_as(&doc! { "user_id": user_id })
            .await?
            .ok_or_else(|| Error::not_found(format!("user {} is not in the social graph", user_id)))?;
        let edges = match side {
            Side::Followers => node.followers,
            Side::Followees => node.followees,
        };
        if let Err(e) = self.cache.put_as(&key, &edges).await {
            warn!(target: "trellis::services", key = %key, error = %e, "Graph cache populate failed");
        }
        Ok(edges)
    }

    /// Ids of the users following `user_id`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the user has no graph node.
    pub async fn get_followers(&self, user_id: i64) -> Result<Vec<i64>> {
        let edges = self.edges(user_id, Side::Followers).await?;
        Ok(edges.into_iter().map(|e| e.user_id).collect())
    }

    /// Ids of the users `user_id` follows.
    ///
    /// # Errors
    ///
    /// `NotFound` if the user has no graph node.
    pub async fn get_followees(&self, user_id: i64) -> Result<Vec<i64>> {
        let edges = self.edges(user_id, Side::Followees).await?;
        Ok(edges.into_iter().map(|e| e.user_id).collect())
    }

    async fn push_edge(&self, owner: i64, side: Side, edge: Edge) -> Result<u64> {
        let field = side.field();
        let filter = doc! {
            "user_id": owner,
            format!("{}.user_id", field): { "$ne": edge.user_id },
        };
        let update = doc! {
            "$push": { field: { "user_id": edge.user_id, "timestamp": edge.timestamp } },
        };
        self.graph.update_one(&filter, &update).await
    }

    async fn pull_edge(&self, owner: i64, side: Side, other: i64) -> Result<u64> {
        let update = doc! { "$pull": { side.field(): { "user_id": other } } };
        self.graph
            .update_one(&doc! { "user_id": owner }, &update)
            .await
    }

    /// Apply `edit` to the cached list of `owner`, if one is cached
    async fn edit_cached(
        &self,
        owner: i64,
        side: Side,
        edit: impl FnOnce(&mut Vec<Edge>),
    ) -> Result<()> {
        let key = side.cache_key(owner);
        if let Some(mut edges) = self.cache.get_as::<Vec<Edge>>(&key).await? {
            edit(&mut edges);
            self.cache.put_as(&key, &edges).await?;
        }
        Ok(())
    }

    async fn follow_cached(&self, user_id: i64, followee_id: i64, timestamp: i64) -> Result<()> {
        self.edit_cached(user_id, Side::Followees, |edges| {
            if !edges.iter().any(|e| e.user_id == followee_id) {
                edges.push(Edge {
                    user_id: followee_id,
                    timestamp,
                });
            }
        })
        .await?;
        self.edit_cached(followee_id, Side::Followers, |edges| {
            if !edges.iter().any(|e| e.user_id == user_id) {
                edges.push(Edge { user_id, timestamp });
            }
        })
        .await
    }

    async fn unfollow_cached(&self, user_id: i64, followee_id: i64) -> Result<()> {
        self.edit_cached(user_id, Side::Followees, |edges| {
            edges.retain(|e| e.user_id != followee_id)
        })
        .await?;
        self.edit_cached(followee_id, Side::Followers, |edges| {
            edges.retain(|e| e.user_id != user_id)
        })
        .await
    }

    /// Record that `user_id` follows `followee_id`.
    ///
    /// Both store documents and both cached lists are updated
    /// concurrently. Following twice leaves a single edge.
    pub async fn follow(&self, user_id: i64, followee_id: i64) -> Result<()> {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let (followees, followers, cached) = tokio::join!(
            self.push_edge(
                user_id,
                Side::Followees,
                Edge {
                    user_id: followee_id,
                    timestamp
                }
            ),
            self.push_edge(followee_id, Side::Followers, Edge { user_id, timestamp }),
            self.follow_cached(user_id, followee_id, timestamp),
        );
        followees?;
        followers?;
        cached?;
        debug!(target: "trellis::services", user_id, followee_id, "Follow");
        Ok(())
    }

    /// Remove the edge `user_id` → `followee_id`, if any
    pub async fn unfollow(&self, user_id: i64, followee_id: i64) -> Result<()> {
        let (followees, followers, cached) = tokio::join!(
            self.pull_edge(user_id, Side::Followees, followee_id),
            self.pull_edge(followee_id, Side::Followers, user_id),
            self.unfollow_cached(user_id, followee_id),
        );
        followees?;
        followers?;
        cached?;
        debug!(target: "trellis::services", user_id, followee_id, "Unfollow");
        Ok(())
    }

    async fn resolve_pair(&self, username: &str, followee_name: &str) -> Result<(i64, i64)> {
        let (user_id, followee_id) = tokio::join!(
            self.user_ids.get_user_id(username),
            self.user_ids.get_user_id(followee_name),
        );
        Ok((user_id?, followee_id?))
    }

    /// [`follow`](Self::follow) by usernames
    pub async fn follow_with_username(&self, username: &str, followee_name: &str) -> Result<()> {
        let (user_id, followee_id) = self.resolve_pair(username, followee_name).await?;
        self.follow(user_id, followee_id).await
    }

    /// [`unfollow`](Self::unfollow) by usernames
    pub async fn unfollow_with_username(&self, username: &str, followee_name: &str) -> Result<()> {
        let (user_id, followee_id) = self.resolve_pair(username, followee_name).await?;
        self.unfollow(user_id, followee_id).await
    }

    /// Create an empty graph node for a new user
    pub async fn insert_user(&self, user_id: i64) -> Result<()> {
        self.graph
            .insert(&GraphNode {
                user_id,
                followers: Vec::new(),
                followees: Vec::new(),
            })
            .await?;
        Ok(())
    }

    /// Empty the graph collection and cache
    pub async fn cleanup(&self) -> Result<()> {
        self.graph.delete_many(&doc! {}).await?;
        self.cache.delete_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_primitives::MemoryCache;
    use trellis_storage::MemoryCollection;

    fn service() -> (SocialGraphService, Arc<MemoryCache>, Arc<MemoryCollection>) {
        let cache = Arc::new(MemoryCache::new());
        let graph = Arc::new(MemoryCollection::new("social-graph"));
        let user_ids = Arc::new(UserIdService::new(
            cache.clone(),
            Arc::new(MemoryCollection::new("user")),
        ));
        (
            SocialGraphService::new(cache.clone(), graph.clone(), user_ids),
            cache,
            graph,
        )
    }

    #[tokio::test]
    async fn test_follow_updates_both_sides() {
        let (graph, _, _) = service();
        for id in 1..=3 {
            graph.insert_user(id).await.unwrap();
        }
        graph.follow(2, 1).await.unwrap();
        graph.follow(3, 1).await.unwrap();

        assert_eq!(graph.get_followers(1).await.unwrap(), vec![2, 3]);
        assert_eq!(graph.get_followees(2).await.unwrap(), vec![1]);
        assert!(graph.get_followees(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_follow_twice_keeps_one_edge() {
        let (graph, cache, _) = service();
        graph.insert_user(1).await.unwrap();
        graph.insert_user(2).await.unwrap();
        graph.follow(2, 1).await.unwrap();
        graph.follow(2, 1).await.unwrap();
        assert_eq!(graph.get_followers(1).await.unwrap(), vec![2]);

        cache.delete_all().await.unwrap();
        assert_eq!(graph.get_followers(1).await.unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_cached_lists_follow_mutations() {
        let (graph, cache, _) = service();
        graph.insert_user(1).await.unwrap();
        graph.insert_user(2).await.unwrap();
        assert!(graph.get_followers(1).await.unwrap().is_empty());
        assert!(cache.get("1:followers").await.unwrap().is_some());

        graph.follow(2, 1).await.unwrap();
        assert_eq!(graph.get_followers(1).await.unwrap(), vec![2]);
        graph.unfollow(2, 1).await.unwrap();
        assert!(graph.get_followers(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let (graph, _, _) = service();
        assert!(graph.get_followers(42).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_cleanup() {
        let (graph, cache, coll) = service();
        graph.insert_user(1).await.unwrap();
        graph.get_followers(1).await.unwrap();
        graph.cleanup().await.unwrap();
        assert!(coll.is_empty());
        assert!(cache.is_empty());
    }
}
