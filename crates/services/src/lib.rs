//! Services built on Trellis
//!
//! Cache-aside repositories and the composers that fan out over them:
//! - repository: generic cache-aside `Repository` over a cache and a collection
//! - social network: ids, text, users, graph, posts, timelines, composition
//! - frontend: request validation and routing
//! - reservation: hotel bookings against cached capacities
//! - delivery: a queue-draining background worker
//! - wiring: every service declared as namespace nodes
//!
//! Every service takes its collaborators as `Arc`s and is safe to share.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compose_post;
pub mod delivery;
pub mod frontend;
pub mod home_timeline;
pub mod media;
pub mod model;
pub mod post_storage;
pub mod repository;
pub mod reservation;
pub mod social_graph;
pub mod text;
pub mod timeline;
pub mod unique_id;
pub mod user;
pub mod user_id;
pub mod user_timeline;
pub mod wiring;

pub use compose_post::{ComposePostDeps, ComposePostService};
pub use delivery::DeliveryWorker;
pub use frontend::{ComposePostRequest, FollowRequest, FrontendDeps, FrontendService, RegisterRequest};
pub use home_timeline::HomeTimelineService;
pub use media::MediaService;
pub use model::*;
pub use post_storage::PostStorageService;
pub use repository::{Entity, Repository, RepositoryStats};
pub use reservation::ReservationService;
pub use social_graph::SocialGraphService;
pub use text::{ComposedText, TextService, UrlShortenService, UserMentionService};
pub use timeline::CachePolicy;
pub use unique_id::UniqueIdService;
pub use user::{LoginClaims, UserService};
pub use user_id::UserIdService;
pub use user_timeline::UserTimelineService;
pub use wiring::{nodes, SocialNetwork};
