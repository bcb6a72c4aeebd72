//! Post composition
//!
//! Composing a post runs in two concurrent stages. The first prepares the
//! post: text processing, media, id allocation and the creator stamp. If
//! any of them fails nothing is published. The second publishes it to the
//! post store, the author's timeline and the home timelines. Publishing
//! does not roll back; when one of those writes fails the others stay
//! visible and the first error is returned.

use std::sync::Arc;
use tracing::{info, warn};
use trellis_core::Result;

use crate::home_timeline::HomeTimelineService;
use crate::media::MediaService;
use crate::model::{Post, PostType};
use crate::post_storage::PostStorageService;
use crate::text::TextService;
use crate::unique_id::UniqueIdService;
use crate::user::UserService;
use crate::user_timeline::UserTimelineService;

/// Collaborators of [`ComposePostService`]
pub struct ComposePostDeps {
    /// Text processing
    pub text: Arc<TextService>,
    /// Media descriptors
    pub media: Arc<MediaService>,
    /// Post ids
    pub unique_ids: Arc<UniqueIdService>,
    /// Creator stamps
    pub users: Arc<UserService>,
    /// Post store
    pub posts: Arc<PostStorageService>,
    /// Author timelines
    pub user_timeline: Arc<UserTimelineService>,
    /// Home feeds
    pub home_timeline: Arc<HomeTimelineService>,
}

/// Creates and publishes posts
pub struct ComposePostService {
    deps: ComposePostDeps,
}

impl ComposePostService {
    /// Composer over its collaborators
    pub fn new(deps: ComposePostDeps) -> Self {
        ComposePostService { deps }
    }

    /// Compose and publish a post. Returns the post id and the ids of the
    /// mentioned users.
    pub async fn compose_post(
        &self,
        username: &str,
        user_id: i64,
        text: &str,
        media_ids: &[i64],
        media_types: &[String],
        post_type: PostType,
    ) -> Result<(i64, Vec<i64>)> {
        let d = &self.deps;
        let timestamp = chrono::Utc::now().timestamp_millis();

        let (composed, media, post_id, creator) = tokio::join!(
            d.text.compose_text(text),
            async { d.media.compose_media(media_types, media_ids) },
            async { d.unique_ids.compose_unique_id(post_type) },
            async { d.users.compose_creator_with_user_id(user_id, username) },
        );
        let composed = composed?;
        let media = media?;

        let mention_ids: Vec<i64> = composed.user_mentions.iter().map(|m| m.user_id).collect();
        let post = Post {
            post_id,
            creator,
            text: composed.text,
            user_mentions: composed.user_mentions,
            media,
            urls: composed.urls,
            timestamp,
            post_type,
        };

        let (stored, user_timeline, home_timeline) = tokio::join!(
            d.posts.store_post(&post),
            d.user_timeline.write_user_timeline(post_id, user_id, timestamp),
            d.home_timeline
                .write_home_timeline(post_id, user_id, timestamp, &mention_ids),
        );
        for (stage, outcome) in [
            ("post store", &stored),
            ("user timeline", &user_timeline),
            ("home timeline", &home_timeline),
        ] {
            if let Err(e) = outcome {
                warn!(target: "trellis::services", post_id, stage, error = %e, "Partial publish");
            }
        }
        stored?;
        user_timeline?;
        home_timeline?;

        info!(target: "trellis::services", post_id, user_id, mentions = mention_ids.len(), "Composed post");
        Ok((post_id, mention_ids))
    }
}
