//! Accounts, credentials and login tokens
//!
//! Passwords are stored as `base64url(sha256(password ‖ salt))` with a
//! random 32-letter salt per user. A login token is
//! `base64url(claims).base64url(sha256(secret ‖ base64url(claims)))`
//! where the claims are a JSON [`LoginClaims`].

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};
use trellis_core::{doc, Error, Result};
use trellis_primitives::{Cache, CacheExt};
use trellis_storage::{CollectionExt, NoSqlCollection};

use crate::model::{Creator, LoginRecord, PostType, User};
use crate::social_graph::SocialGraphService;
use crate::text::random_letters;
use crate::unique_id::UniqueIdService;
use crate::user_id::UserIdService;

const SALT_LEN: usize = 32;

/// Minutes a login token stays valid
pub const TOKEN_TTL_MINUTES: i64 = 6;

/// Claims carried by a login token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginClaims {
    /// Login name
    pub username: String,
    /// User id
    pub user_id: i64,
    /// Issue time, milliseconds since the Unix epoch
    pub timestamp: i64,
    /// Expiry, seconds since the Unix epoch
    pub expires_at: i64,
}

fn hash_password(password: &str, salt: &str) -> String {
    let digest = Sha256::digest(format!("{}{}", password, salt).as_bytes());
    URL_SAFE.encode(digest)
}

fn sign(secret: &str, payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(payload.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

fn login_key(username: &str) -> String {
    format!("{}:Login", username)
}

/// User registration and login
pub struct UserService {
    cache: Arc<dyn Cache>,
    users: Arc<dyn NoSqlCollection>,
    social_graph: Arc<SocialGraphService>,
    unique_ids: Arc<UniqueIdService>,
    user_ids: Arc<UserIdService>,
    secret: String,
}

impl UserService {
    /// Service over the user cache and collection
    pub fn new(
        cache: Arc<dyn Cache>,
        users: Arc<dyn NoSqlCollection>,
        social_graph: Arc<SocialGraphService>,
        unique_ids: Arc<UniqueIdService>,
        user_ids: Arc<UserIdService>,
        secret: impl Into<String>,
    ) -> Self {
        UserService {
            cache,
            users,
            social_graph,
            unique_ids,
            user_ids,
            secret: secret.into(),
        }
    }

    /// Register a user under a generated id. Returns the id.
    pub async fn register_user(
        &self,
        first_name: &str,
        last_name: &str,
        username: &str,
        password: &str,
    ) -> Result<i64> {
        let user_id = self.unique_ids.compose_unique_id(PostType::Post);
        self.register_user_with_id(first_name, last_name, username, password, user_id)
            .await?;
        Ok(user_id)
    }

    /// Register a user under `user_id` and give them an empty graph node.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `username` is already registered.
    pub async fn register_user_with_id(
        &self,
        first_name: &str,
        last_name: &str,
        username: &str,
        password: &str,
        user_id: i64,
    ) -> Result<()> {
        if self.users.count(&doc! { "username": username }).await? > 0 {
            return Err(Error::invalid_argument(format!(
                "username {} is already registered",
                username
            )));
        }
        let salt = random_letters(SALT_LEN);
        let user = User {
            user_id,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            username: username.to_string(),
            password_hash: hash_password(password, &salt),
            salt,
        };
        self.users.insert(&user).await?;
        self.social_graph.insert_user(user_id).await?;
        info!(target: "trellis::services", user_id, username, "Registered user");
        Ok(())
    }

    async fn login_record(&self, username: &str) -> Result<LoginRecord> {
        let key = login_key(username);
        match self.cache.get_as::<LoginRecord>(&key).await {
            Ok(Some(record)) => return Ok(record),
            Ok(None) => {}
            Err(e) => {
                warn!(target: "trellis::services", key = %key, error = %e, "Login cache read failed; using store");
            }
        }
        let user: User = self
            .users
            .find_one_as(&doc! { "username": username })
            .await?
            .ok_or_else(|| Error::not_found(format!("user {} is not registered", username)))?;
        Ok(LoginRecord {
            user_id: user.user_id,
            password_hash: user.password_hash,
            salt: user.salt,
        })
    }

    /// Check credentials and issue a signed login token.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown user, `InvalidArgument` for a wrong
    /// password.
    pub async fn login(&self, username: &str, password: &str) -> Result<String> {
        let record = self.login_record(username).await?;
        if hash_password(password, &record.salt) != record.password_hash {
            debug!(target: "trellis::services", username, "Rejected login");
            return Err(Error::invalid_argument("invalid credentials"));
        }

        let now = chrono::Utc::now();
        let claims = LoginClaims {
            username: username.to_string(),
            user_id: record.user_id,
            timestamp: now.timestamp_millis(),
            expires_at: (now + chrono::Duration::minutes(TOKEN_TTL_MINUTES)).timestamp(),
        };
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
        let token = format!("{}.{}", payload, sign(&self.secret, &payload));

        if let Err(e) = self.cache.put_as(&login_key(username), &record).await {
            warn!(target: "trellis::services", username, error = %e, "Login cache populate failed");
        }
        Ok(token)
    }

    /// Check a token's signature and expiry and return its claims.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a malformed, forged or expired token.
    pub fn verify_token(&self, token: &str) -> Result<LoginClaims> {
        let (payload, signature) = token
            .split_once('.')
            .ok_or_else(|| Error::invalid_argument("malformed login token"))?;
        if sign(&self.secret, payload) != signature {
            return Err(Error::invalid_argument("login token signature mismatch"));
        }
        let bytes = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|e| Error::invalid_argument(format!("malformed login token: {}", e)))?;
        let claims: LoginClaims = serde_json::from_slice(&bytes)?;
        if claims.expires_at < chrono::Utc::now().timestamp() {
            return Err(Error::invalid_argument("login token expired"));
        }
        Ok(claims)
    }

    /// Creator stamp for a known id
    pub fn compose_creator_with_user_id(&self, user_id: i64, username: &str) -> Creator {
        Creator {
            user_id,
            username: username.to_string(),
        }
    }

    /// Creator stamp, looking the id up by username.
    ///
    /// # Errors
    ///
    /// `NotFound` if the user is not registered.
    pub async fn compose_creator_with_username(&self, username: &str) -> Result<Creator> {
        let user_id = self.user_ids.get_user_id(username).await?;
        Ok(self.compose_creator_with_user_id(user_id, username))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_primitives::MemoryCache;
    use trellis_storage::MemoryCollection;

    struct Fixture {
        service: UserService,
        users: Arc<MemoryCollection>,
        graph: Arc<MemoryCollection>,
        cache: Arc<MemoryCache>,
    }

    fn fixture() -> Fixture {
        let cache = Arc::new(MemoryCache::new());
        let users = Arc::new(MemoryCollection::new("user"));
        let graph = Arc::new(MemoryCollection::new("social-graph"));
        let user_ids = Arc::new(UserIdService::new(cache.clone(), users.clone()));
        let social_graph = Arc::new(SocialGraphService::new(
            Arc::new(MemoryCache::new()),
            graph.clone(),
            user_ids.clone(),
        ));
        let service = UserService::new(
            cache.clone(),
            users.clone(),
            social_graph,
            Arc::new(UniqueIdService::new("1").unwrap()),
            user_ids,
            "test-secret",
        );
        Fixture {
            service,
            users,
            graph,
            cache,
        }
    }

    #[test]
    fn test_hash_is_salted() {
        assert_ne!(hash_password("pw", "a"), hash_password("pw", "b"));
        assert_eq!(hash_password("pw", "a"), hash_password("pw", "a"));
    }

    #[tokio::test]
    async fn test_register_creates_user_and_graph_node() {
        let f = fixture();
        f.service
            .register_user_with_id("Ada", "Lovelace", "ada", "pw", 1)
            .await
            .unwrap();
        assert_eq!(f.users.len(), 1);
        assert_eq!(f.graph.len(), 1);

        let user: User = f
            .users
            .find_one_as(&doc! { "username": "ada" })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.salt.len(), 32);
        assert_ne!(user.password_hash, "pw");
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let f = fixture();
        f.service
            .register_user_with_id("A", "B", "ada", "pw", 1)
            .await
            .unwrap();
        let err = f
            .service
            .register_user_with_id("A", "B", "ada", "pw", 2)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(f.users.len(), 1);
    }

    #[tokio::test]
    async fn test_register_user_generates_id() {
        let f = fixture();
        let id = f.service.register_user("A", "B", "ada", "pw").await.unwrap();
        assert!(id > 0);
        let creator = f.service.compose_creator_with_username("ada").await.unwrap();
        assert_eq!(creator.user_id, id);
    }

    #[tokio::test]
    async fn test_login_issues_verifiable_token() {
        let f = fixture();
        f.service
            .register_user_with_id("A", "B", "ada", "pw", 5)
            .await
            .unwrap();
        let token = f.service.login("ada", "pw").await.unwrap();
        let claims = f.service.verify_token(&token).unwrap();
        assert_eq!(claims.username, "ada");
        assert_eq!(claims.user_id, 5);
        assert!(f.cache.get("ada:Login").await.unwrap().is_some());

        // served from the login cache the second time
        assert!(f.service.login("ada", "pw").await.is_ok());
    }

    #[tokio::test]
    async fn test_login_wrong_password() {
        let f = fixture();
        f.service
            .register_user_with_id("A", "B", "ada", "pw", 5)
            .await
            .unwrap();
        let err = f.service.login("ada", "nope").await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(f.service.login("bob", "pw").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_tampered_token_rejected() {
        let f = fixture();
        f.service
            .register_user_with_id("A", "B", "ada", "pw", 5)
            .await
            .unwrap();
        let token = f.service.login("ada", "pw").await.unwrap();
        let (_, signature) = token.split_once('.').unwrap();
        let forged_claims = LoginClaims {
            username: "ada".into(),
            user_id: 1,
            timestamp: 0,
            expires_at: i64::MAX,
        };
        let forged = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged_claims).unwrap()),
            signature
        );
        assert!(f.service.verify_token(&forged).is_err());
        assert!(f.service.verify_token("garbage").is_err());
    }
}
