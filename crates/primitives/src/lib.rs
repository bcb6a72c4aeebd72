//! Backend primitives for Trellis services
//!
//! This crate provides the collaborators repositories and workers are
//! composed from:
//! - cache: `Cache` trait, `MemoryCache`, typed `CacheExt` helpers
//! - queue: bounded `Queue` with cancellable `push`/`pop`
//! - relational: `SqlDatabase`, a parameterized SQL facade over SQLite
//!
//! All of them are `Send + Sync` and safe to share behind `Arc`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod queue;
pub mod relational;

pub use cache::{Cache, CacheExt, MemoryCache};
pub use queue::Queue;
pub use relational::{Rows, SqlDatabase};
