//! Text parsing, link shortening and mention resolution

use once_cell::sync::Lazy;
use rand::distributions::Uniform;
use rand::Rng;
use regex::{Captures, Regex};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use tracing::{debug, warn};
use trellis_core::{Error, Result};
use trellis_primitives::{Cache, CacheExt};
use trellis_storage::{in_filter, CollectionExt, NoSqlCollection};

use crate::model::{Url, User, UserMention};

static MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@[a-zA-Z0-9_-]+").expect("mention pattern is valid"));

static LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(http://|https://)([a-zA-Z0-9_!~*'().&=+$%-]+)").expect("link pattern is valid")
});

const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Host prefix of every shortened link
pub const SHORT_URL_HOST: &str = "http://short-url/";

/// Random ASCII letters
pub(crate) fn random_letters(len: usize) -> String {
    let pick = Uniform::from(0..LETTERS.len());
    rand::thread_rng()
        .sample_iter(pick)
        .take(len)
        .map(|i| LETTERS[i] as char)
        .collect()
}

/// Cache key of the username → user id index
pub fn user_id_key(username: &str) -> String {
    format!("{}:UserID", username)
}

/// Usernames mentioned in `text`, without the `@`, in order of appearance
pub fn extract_mentions(text: &str) -> Vec<String> {
    MENTION
        .find_iter(text)
        .map(|m| m.as_str()[1..].to_string())
        .collect()
}

/// Links in `text`, in order of appearance
pub fn extract_urls(text: &str) -> Vec<String> {
    LINK.find_iter(text).map(|m| m.as_str().to_string()).collect()
}

/// Shortens links and persists the mapping
pub struct UrlShortenService {
    urls: Arc<dyn NoSqlCollection>,
}

impl UrlShortenService {
    /// Service over the `url-shorten` collection
    pub fn new(urls: Arc<dyn NoSqlCollection>) -> Self {
        UrlShortenService { urls }
    }

    /// Assign a short link to each of `urls`
    pub async fn compose_urls(&self, urls: &[String]) -> Result<Vec<Url>> {
        let shortened: Vec<Url> = urls
            .iter()
            .map(|expanded| Url {
                shortened_url: format!("{}{}", SHORT_URL_HOST, random_letters(10)),
                expanded_url: expanded.clone(),
            })
            .collect();
        if !shortened.is_empty() {
            let docs = shortened
                .iter()
                .map(trellis_core::to_document)
                .collect::<Result<Vec<_>>>()?;
            self.urls.insert_many(docs).await?;
        }
        Ok(shortened)
    }

    /// Expand short links. Unknown links are skipped.
    pub async fn get_extended_urls(&self, shortened: &[String]) -> Result<Vec<String>> {
        if shortened.is_empty() {
            return Ok(Vec::new());
        }
        let known: Vec<Url> = self
            .urls
            .find_many_as(&in_filter("shortened_url", shortened.iter().map(String::as_str)))
            .await?;
        let by_short: FxHashMap<&str, &str> = known
            .iter()
            .map(|u| (u.shortened_url.as_str(), u.expanded_url.as_str()))
            .collect();
        Ok(shortened
            .iter()
            .filter_map(|s| by_short.get(s.as_str()).map(|e| e.to_string()))
            .collect())
    }
}

/// Resolves `@username` mentions to user ids
pub struct UserMentionService {
    cache: Arc<dyn Cache>,
    users: Arc<dyn NoSqlCollection>,
}

impl UserMentionService {
    /// Service over the user cache and the `user` collection
    pub fn new(cache: Arc<dyn Cache>, users: Arc<dyn NoSqlCollection>) -> Self {
        UserMentionService { cache, users }
    }

    /// Resolve every username, consulting the username index first.
    ///
    /// # Errors
    ///
    /// `NotFound` if any username is not registered.
    pub async fn compose_user_mentions(&self, usernames: &[String]) -> Result<Vec<UserMention>> {
        let mut seen = FxHashSet::default();
        let unique: Vec<&String> = usernames.iter().filter(|n| seen.insert(*n)).collect();
        if unique.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = unique.iter().map(|n| user_id_key(n)).collect();
        let cached = match self.cache.mget_as::<i64>(&keys).await {
            Ok(values) => values,
            Err(e) => {
                warn!(target: "trellis::services", error = %e, "Mention index mget failed; using store");
                vec![None; keys.len()]
            }
        };

        let mut ids: FxHashMap<String, i64> = FxHashMap::default();
        let mut misses = Vec::new();
        for (name, id) in unique.iter().zip(cached) {
            match id {
                Some(id) => {
                    ids.insert((*name).clone(), id);
                }
                None => misses.push((*name).clone()),
            }
        }

        if !misses.is_empty() {
            debug!(target: "trellis::services", misses = misses.len(), "Looking up mentioned users in store");
            let found: Vec<User> = self
                .users
                .find_many_as(&in_filter("username", misses.iter().map(String::as_str)))
                .await?;
            for user in found {
                if let Err(e) = self.cache.put_as(&user_id_key(&user.username), &user.user_id).await {
                    warn!(target: "trellis::services", username = %user.username, error = %e, "Mention index populate failed");
                }
                ids.insert(user.username, user.user_id);
            }
        }

        unique
            .into_iter()
            .map(|name| match ids.get(name) {
                Some(&user_id) => Ok(UserMention {
                    user_id,
                    username: name.clone(),
                }),
                None => Err(Error::not_found(format!("mentioned user {} is not registered", name))),
            })
            .collect()
    }
}

/// Output of [`TextService::compose_text`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedText {
    /// Text with every link replaced by its short form
    pub text: String,
    /// Resolved mentions
    pub user_mentions: Vec<UserMention>,
    /// Shortened links
    pub urls: Vec<Url>,
}

/// Turns raw post text into its stored form
pub struct TextService {
    url_shorten: Arc<UrlShortenService>,
    user_mention: Arc<UserMentionService>,
}

impl TextService {
    /// Compose over a link shortener and a mention resolver
    pub fn new(url_shorten: Arc<UrlShortenService>, user_mention: Arc<UserMentionService>) -> Self {
        TextService {
            url_shorten,
            user_mention,
        }
    }

    /// Shorten links and resolve mentions concurrently
    pub async fn compose_text(&self, text: &str) -> Result<ComposedText> {
        let usernames = extract_mentions(text);
        let links = extract_urls(text);

        let (urls, user_mentions) = tokio::join!(
            self.url_shorten.compose_urls(&links),
            self.user_mention.compose_user_mentions(&usernames),
        );
        let urls = urls?;
        let user_mentions = user_mentions?;

        let mut shortened = urls.iter();
        let updated = LINK
            .replace_all(text, |caps: &Captures| match shortened.next() {
                Some(url) => url.shortened_url.clone(),
                None => caps[0].to_string(),
            })
            .into_owned();
        Ok(ComposedText {
            text: updated,
            user_mentions,
            urls,
        })
    }
}
