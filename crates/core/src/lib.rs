//! Core types for Trellis
//!
//! This crate defines the foundational types used throughout the system:
//! - Value: the closed set of field value shapes
//! - Document: ordered key-value record with an `_id` primary key
//! - ObjectId: 16-byte document identity
//! - FieldPath: parsed dotted selectors (`a.0.b`)
//! - convert: serde adapter between caller types and documents
//! - Error: the error kinds shared by every layer

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod convert;
pub mod document;
pub mod error;
pub mod path;
pub mod types;
pub mod value;

pub use convert::{from_document, from_value, to_document, to_value};
pub use document::{Document, ID_FIELD};
pub use error::{Error, Result};
pub use path::{FieldPath, PathSegment};
pub use types::ObjectId;
pub use value::Value;

#[doc(hidden)]
pub mod __private {
    pub use serde_json::json;
    pub use serde_json::Value as JsonValue;
}
