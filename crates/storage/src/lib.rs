//! Document engine for Trellis
//!
//! This crate provides the collection-scoped document store:
//! - filter: Mongo-style query parsing and evaluation with dotted paths
//!   and array broadcast
//! - update: `$set`/`$unset`/`$inc`/`$push`/`$addToSet`/`$pull`
//! - projection: field inclusion/exclusion and `$slice`
//! - cursor: materialized result sets decoded into caller types
//! - traits: `NoSqlDatabase` / `NoSqlCollection`, the store contract
//! - memory: the in-process implementation
//!
//! # Example
//!
//! ```ignore
//! use trellis_core::doc;
//! use trellis_storage::{MemoryDatabase, NoSqlDatabase};
//!
//! let db = MemoryDatabase::new();
//! let ratings = db.collection("hotel", "ratings").await?;
//! ratings.insert_one(doc! { "type": "A", "rating": 5 }).await?;
//! let high = ratings.find_many(&doc! { "rating": { "$gt": 6 } }, None).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cursor;
pub mod ext;
pub mod filter;
pub mod memory;
pub mod projection;
pub mod traits;
pub mod update;

pub use cursor::Cursor;
pub use ext::{id_filter, in_filter, CollectionExt};
pub use filter::{parse_filter, Comparison, Filter};
pub use memory::{MemoryCollection, MemoryDatabase};
pub use projection::Projection;
pub use traits::{NoSqlCollection, NoSqlDatabase};
pub use update::{parse_update, Update};
