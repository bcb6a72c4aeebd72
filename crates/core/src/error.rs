//! Error types for Trellis
//!
//! Every layer (document engine, cache, queue, namespace, services) reports
//! failures through the single [`Error`] enum defined here. The variants are
//! grouped by meaning rather than by origin so that callers can decide on a
//! recovery policy without inspecting the backend:
//!
//! - `NotFound` is usually surfaced as an empty result rather than an error
//! - `Cache` is recoverable by falling through to the authoritative store
//! - everything else propagates to the caller
//!
//! `Error` is `Clone` because namespace nodes and service registries memoize
//! build failures and hand the same error out on every lookup.

use std::io;
use thiserror::Error;

/// Result type alias for Trellis operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Trellis
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    /// A lookup by key or id found nothing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed filter, update or projection document
    #[error("Bad query: {0}")]
    BadQuery(String),

    /// An update operator met a value of an incompatible type
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Type the operation required
        expected: String,
        /// Type that was actually present
        found: String,
    },

    /// Cache backend failure (network, encoding)
    #[error("Cache error: {0}")]
    Cache(String),

    /// Store, queue or SQL backend could not serve the request
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Caller supplied arguments that cannot be acted upon
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation observed cancellation of its scope
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Building a namespace node or registry binding failed
    #[error("Build error for {node}: {message}")]
    Build {
        /// Name of the node or registry
        node: String,
        /// Underlying failure
        message: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error (config files, sockets)
    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// Create a `NotFound` error
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    /// Create a `BadQuery` error
    pub fn bad_query(msg: impl Into<String>) -> Self {
        Error::BadQuery(msg.into())
    }

    /// Create a `TypeMismatch` error
    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Error::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create a `Cache` error
    pub fn cache(msg: impl Into<String>) -> Self {
        Error::Cache(msg.into())
    }

    /// Create a `BackendUnavailable` error
    pub fn backend(msg: impl Into<String>) -> Self {
        Error::BackendUnavailable(msg.into())
    }

    /// Create an `InvalidArgument` error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Create a `Cancelled` error
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Error::Cancelled(msg.into())
    }

    /// Create a `Build` error
    pub fn build(node: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Build {
            node: node.into(),
            message: message.into(),
        }
    }

    /// Create a `Serialization` error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Error::Serialization(msg.into())
    }

    /// True for `NotFound`
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// True for `Cache`
    pub fn is_cache(&self) -> bool {
        matches!(self, Error::Cache(_))
    }

    /// True for `Cancelled`
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }

    /// True for `BadQuery`
    pub fn is_bad_query(&self) -> bool {
        matches!(self, Error::BadQuery(_))
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(e: rmp_serde::encode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for Error {
    fn from(e: rmp_serde::decode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
