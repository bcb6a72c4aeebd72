//! Username → user id lookups

use std::sync::Arc;
use tracing::warn;
use trellis_core::{doc, Error, Result};
use trellis_primitives::{Cache, CacheExt};
use trellis_storage::{CollectionExt, NoSqlCollection};

use crate::model::User;
use crate::text::user_id_key;

/// Resolves usernames through the `"{username}:UserID"` index
pub struct UserIdService {
    cache: Arc<dyn Cache>,
    users: Arc<dyn NoSqlCollection>,
}

impl UserIdService {
    /// Service over the user cache and the `user` collection
    pub fn new(cache: Arc<dyn Cache>, users: Arc<dyn NoSqlCollection>) -> Self {
        UserIdService { cache, users }
    }

    /// Id of `username`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the user is not registered.
    pub async fn get_user_id(&self, username: &str) -> Result<i64> {
        let key = user_id_key(username);
        match self.cache.get_as::<i64>(&key).await {
            Ok(Some(id)) => return Ok(id),
            Ok(None) => {}
            Err(e) => {
                warn!(target: "trellis::services", key = %key, error = %e, "User id cache read failed; using store");
            }
        }

        let user: User = self
            .users
            .find_one_as(&doc! { "username": username })
            .await?
            .ok_or_else(|| Error::not_found(format!("user {} is not registered", username)))?;
        if let Err(e) = self.cache.put_as(&key, &user.user_id).await {
            warn!(target: "trellis::services", key = %key, error = %e, "User id cache populate failed");
        }
        Ok(user.user_id)
    }
}
