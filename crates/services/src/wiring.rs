//! Namespace wiring for the social network
//!
//! [`SocialNetwork::wire`] declares every service as a namespace node. All
//! collections live in one in-memory document database whose name comes
//! from the `database` argument; each service gets its own cache so their
//! key spaces never overlap.

use std::sync::Arc;
use tracing::info;
use trellis_core::{Error, Result};
use trellis_engine::{Built, Namespace, NamespaceBuilder, ServiceRegistry, TrellisConfig};
use trellis_primitives::{Cache, MemoryCache, Queue};
use trellis_storage::{MemoryDatabase, NoSqlCollection, NoSqlDatabase};

use crate::compose_post::{ComposePostDeps, ComposePostService};
use crate::delivery::DeliveryWorker;
use crate::frontend::{FrontendDeps, FrontendService};
use crate::home_timeline::HomeTimelineService;
use crate::media::MediaService;
use crate::model::Delivery;
use crate::post_storage::PostStorageService;
use crate::reservation::ReservationService;
use crate::social_graph::SocialGraphService;
use crate::text::{TextService, UrlShortenService, UserMentionService};
use crate::unique_id::UniqueIdService;
use crate::user::UserService;
use crate::user_id::UserIdService;
use crate::user_timeline::UserTimelineService;

/// Node names
pub mod nodes {
    /// `Arc<dyn NoSqlDatabase>` shared by every service
    pub const NOSQL: &str = "nosql";
    /// `UniqueIdService`
    pub const UNIQUE_ID: &str = "unique-id";
    /// `UrlShortenService`
    pub const URL_SHORTEN: &str = "url-shorten";
    /// `UserMentionService`
    pub const USER_MENTION: &str = "user-mention";
    /// `TextService`
    pub const TEXT: &str = "text";
    /// `MediaService`
    pub const MEDIA: &str = "media";
    /// `UserIdService`
    pub const USER_ID: &str = "user-id";
    /// `SocialGraphService`
    pub const SOCIAL_GRAPH: &str = "social-graph";
    /// `UserService`
    pub const USER: &str = "user";
    /// `PostStorageService`
    pub const POST_STORAGE: &str = "post-storage";
    /// `UserTimelineService`
    pub const USER_TIMELINE: &str = "user-timeline";
    /// `HomeTimelineService`
    pub const HOME_TIMELINE: &str = "home-timeline";
    /// `ComposePostService`
    pub const COMPOSE_POST: &str = "compose-post";
    /// `FrontendService`
    pub const FRONTEND: &str = "frontend";
    /// `ServiceRegistry<Arc<FrontendService>>`
    pub const FRONTEND_REGISTRY: &str = "frontend-registry";
    /// `ReservationService`
    pub const RESERVATION: &str = "reservation";
    /// `ServiceRegistry<Arc<ReservationService>>`
    pub const RESERVATION_REGISTRY: &str = "reservation-registry";
    /// `Queue<Delivery>`
    pub const DELIVERY_QUEUE: &str = "delivery-queue";
    /// `DeliveryWorker`, started when the namespace is built
    pub const DELIVERY_WORKER: &str = "delivery-worker";

    /// Per-service `Arc<dyn Cache>` nodes
    pub const CACHES: &[&str] = &[
        "user-cache",
        "social-graph-cache",
        "post-cache",
        "user-timeline-cache",
        "home-timeline-cache",
        "reservation-cache",
    ];
}

/// Cache for a configured backend name
pub fn new_cache(backend: &str) -> Result<Arc<dyn Cache>> {
    match backend {
        "memory" => Ok(Arc::new(MemoryCache::new())),
        other => Err(Error::invalid_argument(format!(
            "unknown cache backend {:?}",
            other
        ))),
    }
}

async fn cache(ns: &Namespace, name: &str) -> Result<Arc<dyn Cache>> {
    ns.get_cloned::<Arc<dyn Cache>>(name).await
}

async fn collection(ns: &Namespace, name: &str) -> Result<Arc<dyn NoSqlCollection>> {
    let db = ns.get_cloned::<Arc<dyn NoSqlDatabase>>(nodes::NOSQL).await?;
    let database = ns.get_parsed::<String>("database").await?;
    db.collection(&database, name).await
}

/// Social network and hotel services as namespace nodes
pub struct SocialNetwork;

impl SocialNetwork {
    /// Declare every service on `builder`, with `config` supplying the
    /// argument defaults. The delivery worker is instantiated on build.
    pub fn wire(builder: NamespaceBuilder, config: &TrellisConfig) -> NamespaceBuilder {
        let mut builder = builder
            .set_config(config)
            .define(nodes::NOSQL, |_ns: Namespace| async move {
                Ok(Built::value::<Arc<dyn NoSqlDatabase>>(Arc::new(MemoryDatabase::new())))
            });

        for name in nodes::CACHES {
            builder = builder.define(*name, |ns: Namespace| async move {
                let backend = ns.get_parsed::<String>("cache-backend").await?;
                Ok(Built::value(new_cache(&backend)?))
            });
        }

        builder
            .define(nodes::UNIQUE_ID, |ns: Namespace| async move {
                let machine_id = ns.get_parsed::<String>("machine-id").await?;
                Ok(Built::value(UniqueIdService::new(&machine_id)?))
            })
            .define(nodes::URL_SHORTEN, |ns: Namespace| async move {
                Ok(Built::value(UrlShortenService::new(
                    collection(&ns, "url-shorten").await?,
                )))
            })
            .define(nodes::USER_MENTION, |ns: Namespace| async move {
                Ok(Built::value(UserMentionService::new(
                    cache(&ns, "user-cache").await?,
                    collection(&ns, "user").await?,
                )))
            })
            .define(nodes::TEXT, |ns: Namespace| async move {
                Ok(Built::value(TextService::new(
                    ns.get::<UrlShortenService>(nodes::URL_SHORTEN).await?,
                    ns.get::<UserMentionService>(nodes::USER_MENTION).await?,
                )))
            })
            .define(nodes::MEDIA, |_ns: Namespace| async move {
                Ok(Built::value(MediaService::new()))
            })
            .define(nodes::USER_ID, |ns: Namespace| async move {
                Ok(Built::value(UserIdService::new(
                    cache(&ns, "user-cache").await?,
                    collection(&ns, "user").await?,
                )))
            })
            .define(nodes::SOCIAL_GRAPH, |ns: Namespace| async move {
                Ok(Built::value(SocialGraphService::new(
                    cache(&ns, "social-graph-cache").await?,
                    collection(&ns, "social-graph").await?,
                    ns.get::<UserIdService>(nodes::USER_ID).await?,
                )))
            })
            .define(nodes::USER, |ns: Namespace| async move {
                Ok(Built::value(UserService::new(
                    cache(&ns, "user-cache").await?,
                    collection(&ns, "user").await?,
                    ns.get::<SocialGraphService>(nodes::SOCIAL_GRAPH).await?,
                    ns.get::<UniqueIdService>(nodes::UNIQUE_ID).await?,
                    ns.get::<UserIdService>(nodes::USER_ID).await?,
                    ns.get_parsed::<String>("login-secret").await?,
                )))
            })
            .define(nodes::POST_STORAGE, |ns: Namespace| async move {
                Ok(Built::value(PostStorageService::new(
                    cache(&ns, "post-cache").await?,
                    collection(&ns, "post").await?,
                )))
            })
            .define(nodes::USER_TIMELINE, |ns: Namespace| async move {
                Ok(Built::value(UserTimelineService::new(
                    cache(&ns, "user-timeline-cache").await?,
                    collection(&ns, "user-timeline").await?,
                    ns.get::<PostStorageService>(nodes::POST_STORAGE).await?,
                )))
            })
            .define(nodes::HOME_TIMELINE, |ns: Namespace| async move {
                Ok(Built::value(HomeTimelineService::new(
                    cache(&ns, "home-timeline-cache").await?,
                    collection(&ns, "home-timeline").await?,
                    ns.get::<PostStorageService>(nodes::POST_STORAGE).await?,
                    ns.get::<SocialGraphService>(nodes::SOCIAL_GRAPH).await?,
                )))
            })
            .define(nodes::COMPOSE_POST, |ns: Namespace| async move {
                Ok(Built::value(ComposePostService::new(ComposePostDeps {
                    text: ns.get(nodes::TEXT).await?,
                    media: ns.get(nodes::MEDIA).await?,
                    unique_ids: ns.get(nodes::UNIQUE_ID).await?,
                    users: ns.get(nodes::USER).await?,
                    posts: ns.get(nodes::POST_STORAGE).await?,
                    user_timeline: ns.get(nodes::USER_TIMELINE).await?,
                    home_timeline: ns.get(nodes::HOME_TIMELINE).await?,
                })))
            })
            .define(nodes::FRONTEND, |ns: Namespace| async move {
                Ok(Built::value(FrontendService::new(FrontendDeps {
                    users: ns.get(nodes::USER).await?,
                    compose_post: ns.get(nodes::COMPOSE_POST).await?,
                    user_timeline: ns.get(nodes::USER_TIMELINE).await?,
                    home_timeline: ns.get(nodes::HOME_TIMELINE).await?,
                    social_graph: ns.get(nodes::SOCIAL_GRAPH).await?,
                })))
            })
            .define(nodes::FRONTEND_REGISTRY, |ns: Namespace| async move {
                let frontend = ns.get::<FrontendService>(nodes::FRONTEND).await?;
                let registry = ServiceRegistry::<Arc<FrontendService>>::new("frontend");
                registry.register("local", move || {
                    let frontend = frontend.clone();
                    async move { Ok(frontend) }
                });
                Ok(Built::value(registry))
            })
            .define(nodes::RESERVATION, |ns: Namespace| async move {
                let service = ReservationService::new(
                    cache(&ns, "reservation-cache").await?,
                    collection(&ns, "reservation").await?,
                    collection(&ns, "hotel-capacity").await?,
                );
                service.seed_default_capacities().await?;
                Ok(Built::value(service))
            })
            .define(nodes::RESERVATION_REGISTRY, |ns: Namespace| async move {
                let reservation = ns.get::<ReservationService>(nodes::RESERVATION).await?;
                let registry = ServiceRegistry::<Arc<ReservationService>>::new("reservation");
                registry.register("local", move || {
                    let reservation = reservation.clone();
                    async move { Ok(reservation) }
                });
                Ok(Built::value(registry))
            })
            .define(nodes::DELIVERY_QUEUE, |ns: Namespace| async move {
                let capacity = ns.get_parsed::<usize>("queue-capacity").await?;
                Ok(Built::value(Queue::<Delivery>::new(capacity)))
            })
            .define(nodes::DELIVERY_WORKER, |ns: Namespace| async move {
                let worker = DeliveryWorker::new(
                    ns.get::<Queue<Delivery>>(nodes::DELIVERY_QUEUE).await?,
                    collection(&ns, "delivery").await?,
                );
                info!(target: "trellis::services", namespace = ns.name(), "Wired delivery worker");
                Ok(Built::runnable(worker))
            })
            .instantiate(nodes::DELIVERY_WORKER)
    }
}
