//! Trellis - cache-aside document services for Rust
//!
//! Trellis builds request-handling services out of three collaborators:
//! a document store queried with Mongo-style filters, a byte cache, and a
//! namespace that wires everything together from flags, environment
//! variables and `trellis.toml`.
//!
//! # Quick Start
//!
//! ```ignore
//! use trellis::{NamespaceBuilder, SocialNetwork, TrellisConfig};
//! use trellis::services::{nodes, FrontendService, RegisterRequest};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = TrellisConfig::default();
//! let ns = SocialNetwork::wire(NamespaceBuilder::new("social"), &config)
//!     .build(&CancellationToken::new())
//!     .await?;
//! let frontend = ns.get::<FrontendService>(nodes::FRONTEND).await?;
//! frontend.register(RegisterRequest { /* ... */ }).await?;
//! ```
//!
//! # Architecture
//!
//! Each layer lives in its own crate and is re-exported here:
//! - [`core`]: `Value`, `Document`, `ObjectId` and the shared `Error`
//! - [`storage`]: the document store contract and its in-memory engine
//! - [`primitives`]: cache, bounded queue and the relational facade
//! - [`engine`]: namespace, service registry, config and logging
//! - [`services`]: repositories and composers built on the layers above

pub use trellis_core as core;
pub use trellis_engine as engine;
pub use trellis_primitives as primitives;
pub use trellis_services as services;
pub use trellis_storage as storage;

pub use trellis_core::{doc, Document, Error, ObjectId, Result, Value};
pub use trellis_engine::{Namespace, NamespaceBuilder, Runnable, ServiceRegistry, TrellisConfig};
pub use trellis_primitives::{Cache, CacheExt, MemoryCache, Queue};
pub use trellis_services::SocialNetwork;
pub use trellis_storage::{CollectionExt, MemoryDatabase, NoSqlCollection, NoSqlDatabase};
