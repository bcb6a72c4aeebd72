//! Wiring layer for Trellis
//!
//! This crate assembles services rather than implementing them:
//! - Namespace: named, lazily built, memoized nodes with argument resolution
//!   from flags and environment, parent fall-through and Runnable lifecycle
//! - ServiceRegistry: named bindings for one service with a memoized default
//! - TrellisConfig: `trellis.toml` loading
//! - logging: console subscriber setup

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod logging;
pub mod namespace;
pub mod registry;
pub mod runnable;

pub use config::{TrellisConfig, CONFIG_FILE_NAME};
pub use namespace::{env_var_name, BuildFn, Built, Namespace, NamespaceBuilder};
pub use registry::ServiceRegistry;
pub use runnable::Runnable;
