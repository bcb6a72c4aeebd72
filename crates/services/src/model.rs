//! Entities stored by the social-network services

use serde::{Deserialize, Serialize};

/// Author stamp denormalized into every post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Creator {
    /// User id
    pub user_id: i64,
    /// Login name
    pub username: String,
}

/// A resolved `@username` mention
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMention {
    /// User id
    pub user_id: i64,
    /// Login name
    pub username: String,
}

/// Media attached to a post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    /// Media id
    pub media_id: i64,
    /// MIME-like media kind
    pub media_type: String,
}

/// A shortened link and the link it stands for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Url {
    /// Link published in the post text
    pub shortened_url: String,
    /// Link the author wrote
    pub expanded_url: String,
}

/// Kind of post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PostType {
    #[default]
    /// Original post
    Post,
    /// Share of another post
    Repost,
    /// Reply to another post
    Reply,
    /// Direct message
    Dm,
}

impl PostType {
    /// Numeric code used on the wire by older clients
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => PostType::Repost,
            2 => PostType::Reply,
            3 => PostType::Dm,
            _ => PostType::Post,
        }
    }
}

/// A published post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Post id from the unique-id generator
    pub post_id: i64,
    /// Author
    pub creator: Creator,
    /// Text with links shortened
    pub text: String,
    /// Mentioned users
    pub user_mentions: Vec<UserMention>,
    /// Attached media
    pub media: Vec<Media>,
    /// Shortened links
    pub urls: Vec<Url>,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    /// Kind of post
    pub post_type: PostType,
}

/// One timeline entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostInfo {
    /// Post id from the unique-id generator
    pub post_id: i64,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

/// Stored timeline of one user, oldest entry first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeline {
    /// Owner of the timeline
    pub user_id: i64,
    /// Entries in append order
    pub posts: Vec<PostInfo>,
}

/// A registered account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User id
    pub user_id: i64,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Login name
    pub username: String,
    /// Per-user password salt
    pub salt: String,
    /// base64url(sha256(password ‖ salt))
    pub password_hash: String,
}

/// Cached credentials for `login`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRecord {
    /// User id
    pub user_id: i64,
    /// base64url(sha256(password ‖ salt))
    pub password_hash: String,
    /// Per-user password salt
    pub salt: String,
}

/// One follow edge, as seen from either endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// User id
    pub user_id: i64,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

/// Adjacency lists of one user in the social graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    /// User id
    pub user_id: i64,
    /// Users following this user
    pub followers: Vec<Edge>,
    /// Users this user follows
    pub followees: Vec<Edge>,
}

/// A meal delivery handed to the delivery worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    /// Order the delivery belongs to
    pub order_id: String,
    /// Ordered food
    pub food_name: String,
    /// Store preparing the order
    pub store_name: String,
    /// Station to deliver to
    pub station_name: String,
}

/// A booked night at a hotel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Confirmation number
    pub confirmation: i64,
    /// Hotel id
    pub hotel_id: String,
    /// Guest name
    pub customer_name: String,
    /// Check-in date (YYYY-MM-DD)
    pub in_date: String,
    /// Check-out date (YYYY-MM-DD)
    pub out_date: String,
    /// Number of rooms
    pub rooms: i64,
}

/// Room capacity of a hotel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotelCapacity {
    /// Hotel id
    pub hotel_id: String,
    /// Number of rooms
    pub rooms: i64,
}
