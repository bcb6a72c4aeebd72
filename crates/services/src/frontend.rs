//! Request entry point
//!
//! [`FrontendService`] validates incoming requests and routes them to the
//! services that carry them out.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use trellis_core::{Error, Result};

use crate::compose_post::ComposePostService;
use crate::home_timeline::HomeTimelineService;
use crate::model::PostType;
use crate::social_graph::SocialGraphService;
use crate::user::UserService;
use crate::user_timeline::UserTimelineService;

/// Follow or unfollow request; either both ids or both usernames
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowRequest {
    /// Follower id
    pub user_id: Option<i64>,
    /// Followee id
    pub followee_id: Option<i64>,
    /// Follower username
    pub username: Option<String>,
    /// Followee username
    pub followee_name: Option<String>,
}

impl FollowRequest {
    /// Request by user ids
    pub fn by_id(user_id: i64, followee_id: i64) -> Self {
        FollowRequest {
            user_id: Some(user_id),
            followee_id: Some(followee_id),
            ..Default::default()
        }
    }

    /// Request by usernames
    pub fn by_username(username: impl Into<String>, followee_name: impl Into<String>) -> Self {
        FollowRequest {
            username: Some(username.into()),
            followee_name: Some(followee_name.into()),
            ..Default::default()
        }
    }
}

enum FollowTarget<'a> {
    Ids(i64, i64),
    Names(&'a str, &'a str),
}

impl FollowRequest {
    fn target(&self) -> Result<FollowTarget<'_>> {
        if let (Some(a), Some(b)) = (self.user_id, self.followee_id) {
            return Ok(FollowTarget::Ids(a, b));
        }
        match (self.username.as_deref(), self.followee_name.as_deref()) {
            (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => Ok(FollowTarget::Names(a, b)),
            _ => Err(Error::invalid_argument(
                "follow needs both user ids or both usernames",
            )),
        }
    }
}

/// New account request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Login name
    pub username: String,
    /// Clear-text password
    pub password: String,
    /// Id to register under
    pub user_id: i64,
}

/// New post request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposePostRequest {
    /// Author id
    pub user_id: i64,
    /// Author username
    pub username: String,
    /// Kind of post
    #[serde(default)]
    pub post_type: PostType,
    /// Raw text
    pub text: String,
    /// Media kinds, parallel to `media_ids`
    #[serde(default)]
    pub media_types: Vec<String>,
    /// Media ids
    #[serde(default)]
    pub media_ids: Vec<i64>,
}

/// Collaborators of [`FrontendService`]
pub struct FrontendDeps {
    /// Accounts
    pub users: Arc<UserService>,
    /// Post composition
    pub compose_post: Arc<ComposePostService>,
    /// Author timelines
    pub user_timeline: Arc<UserTimelineService>,
    /// Home feeds
    pub home_timeline: Arc<HomeTimelineService>,
    /// Follow graph
    pub social_graph: Arc<SocialGraphService>,
}

/// Validates requests and dispatches them
pub struct FrontendService {
    deps: FrontendDeps,
}

impl FrontendService {
    /// Frontend over its collaborators
    pub fn new(deps: FrontendDeps) -> Self {
        FrontendService { deps }
    }

    /// Register an account.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if any text field is empty.
    pub async fn register(&self, req: &RegisterRequest) -> Result<()> {
        if req.first_name.is_empty()
            || req.last_name.is_empty()
            || req.username.is_empty()
            || req.password.is_empty()
        {
            return Err(Error::invalid_argument("incomplete registration"));
        }
        self.deps
            .users
            .register_user_with_id(
                &req.first_name,
                &req.last_name,
                &req.username,
                &req.password,
                req.user_id,
            )
            .await
    }

    /// Follow by ids, or by usernames when the ids are absent
    pub async fn follow(&self, req: &FollowRequest) -> Result<()> {
        match req.target()? {
            FollowTarget::Ids(a, b) => self.deps.social_graph.follow(a, b).await,
            FollowTarget::Names(a, b) => self.deps.social_graph.follow_with_username(a, b).await,
        }
    }

    /// Unfollow by ids, or by usernames when the ids are absent
    pub async fn unfollow(&self, req: &FollowRequest) -> Result<()> {
        match req.target()? {
            FollowTarget::Ids(a, b) => self.deps.social_graph.unfollow(a, b).await,
            FollowTarget::Names(a, b) => {
                self.deps.social_graph.unfollow_with_username(a, b).await
            }
        }
    }

    /// Compose a post. Returns the post id and the mentioned user ids.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a zero user id or an empty username or text.
    pub async fn compose_post(&self, req: &ComposePostRequest) -> Result<(i64, Vec<i64>)> {
        if req.user_id == 0 || req.username.is_empty() || req.text.is_empty() {
            return Err(Error::invalid_argument("incomplete post"));
        }
        debug!(target: "trellis::services", user_id = req.user_id, "Compose request");
        self.deps
            .compose_post
            .compose_post(
                &req.username,
                req.user_id,
                &req.text,
                &req.media_ids,
                &req.media_types,
                req.post_type,
            )
            .await
    }

    /// Post ids `[start, stop)` of a home feed, newest first
    pub async fn read_home_timeline(&self, user_id: i64, start: i64, stop: i64) -> Result<Vec<i64>> {
        self.deps
            .home_timeline
            .read_home_timeline(user_id, start, stop)
            .await
    }

    /// Post ids `[start, stop)` of an author timeline, newest first
    pub async fn read_user_timeline(&self, user_id: i64, start: i64, stop: i64) -> Result<Vec<i64>> {
        self.deps
            .user_timeline
            .read_user_timeline(user_id, start, stop)
            .await
    }

    /// Log in and return a signed token
    pub async fn login(&self, username: &str, password: &str) -> Result<String> {
        if username.is_empty() || password.is_empty() {
            return Err(Error::invalid_argument("incomplete credentials"));
        }
        self.deps.users.login(username, password).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_follow_target_prefers_ids() {
        let mut req = FollowRequest::by_username("a", "b");
        req.user_id = Some(1);
        req.followee_id = Some(2);
        assert!(matches!(req.target(), Ok(FollowTarget::Ids(1, 2))));
        assert!(matches!(
            FollowRequest::by_username("a", "b").target(),
            Ok(FollowTarget::Names("a", "b"))
        ));
    }

    #[test]
    fn test_follow_target_needs_a_pair() {
        let half = FollowRequest {
            user_id: Some(1),
            followee_name: Some("b".into()),
            ..Default::default()
        };
        assert!(matches!(half.target(), Err(Error::InvalidArgument(_))));
        assert!(FollowRequest::default().target().is_err());
        assert!(FollowRequest::by_username("", "b").target().is_err());
    }

    #[test]
    fn test_compose_request_defaults() {
        let req: ComposePostRequest =
            serde_json::from_str(r#"{"user_id": 1, "username": "u1", "text": "hi"}"#).unwrap();
        assert_eq!(req.post_type, PostType::Post);
        assert!(req.media_ids.is_empty());
    }
}
