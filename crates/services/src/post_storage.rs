//! Post store

use std::sync::Arc;
use tracing::debug;
use trellis_core::Result;
use trellis_primitives::Cache;
use trellis_storage::NoSqlCollection;

use crate::model::Post;
use crate::repository::{Entity, Repository, RepositoryStats};

impl Entity for Post {
    const KEY_FIELD: &'static str = "post_id";
    type Key = i64;

    fn key(&self) -> i64 {
        self.post_id
    }
}

/// Write-around post storage with lazy cache population
pub struct PostStorageService {
    posts: Repository<Post>,
}

impl PostStorageService {
    /// Service over the post cache and the `post` collection
    pub fn new(cache: Arc<dyn Cache>, posts: Arc<dyn NoSqlCollection>) -> Self {
        PostStorageService {
            posts: Repository::new(cache, posts),
        }
    }

    /// Persist a new post
    pub async fn store_post(&self, post: &Post) -> Result<()> {
        debug!(target: "trellis::services", post_id = post.post_id, "Storing post");
        self.posts.write(post).await
    }

    /// Read one post.
    ///
    /// # Errors
    ///
    /// `NotFound` if the post does not exist.
    pub async fn read_post(&self, post_id: i64) -> Result<Post> {
        self.posts.read(&post_id).await
    }

    /// Read the posts that exist among `post_ids`, in id order
    pub async fn read_posts(&self, post_ids: &[i64]) -> Result<Vec<Post>> {
        self.posts.read_many(post_ids).await
    }

    /// Empty the post collection and cache
    pub async fn cleanup(&self) -> Result<()> {
        self.posts.cleanup().await
    }

    /// Cache counters
    pub fn stats(&self) -> RepositoryStats {
        self.posts.stats()
    }
}
