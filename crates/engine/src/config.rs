//! Process configuration via `trellis.toml`
//!
//! Every field has a default, so an empty or missing file yields a working
//! single-machine setup backed by the in-memory store and cache. Values are
//! fed into a namespace with [`NamespaceBuilder::set_config`], where flags
//! and environment variables can still override them.
//!
//! [`NamespaceBuilder::set_config`]: crate::namespace::NamespaceBuilder::set_config

use serde::{Deserialize, Serialize};
use std::path::Path;
use trellis_core::{Error, Result};

/// Config file name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "trellis.toml";

/// Cache backends understood by the service wiring.
pub const CACHE_BACKENDS: &[&str] = &["memory"];

/// Configuration loaded from `trellis.toml`.
///
/// # Example
///
/// ```toml
/// machine_id = "1f"
/// queue_capacity = 64
/// cache_backend = "memory"
/// login_secret = "change-me"
/// database = "social-network"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrellisConfig {
    /// Hex machine id prefixed to every generated post id.
    #[serde(default = "default_machine_id")]
    pub machine_id: String,
    /// Capacity of the delivery queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Cache backend name.
    #[serde(default = "default_cache_backend")]
    pub cache_backend: String,
    /// Secret used to sign login tokens.
    #[serde(default = "default_login_secret")]
    pub login_secret: String,
    /// Document database name the services store their collections in.
    #[serde(default = "default_database")]
    pub database: String,
}

fn default_machine_id() -> String {
    "0".to_string()
}

fn default_queue_capacity() -> usize {
    10
}

fn default_cache_backend() -> String {
    "memory".to_string()
}

fn default_login_secret() -> String {
    "secret".to_string()
}

fn default_database() -> String {
    "social-network".to_string()
}

impl Default for TrellisConfig {
    fn default() -> Self {
        Self {
            machine_id: default_machine_id(),
            queue_capacity: default_queue_capacity(),
            cache_backend: default_cache_backend(),
            login_secret: default_login_secret(),
            database: default_database(),
        }
    }
}

impl TrellisConfig {
    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Trellis configuration
#
# Hex machine id prefixed to generated post ids (default: "0")
machine_id = "0"

# Capacity of the delivery queue (default: 10)
queue_capacity = 10

# Cache backend: "memory" (default)
cache_backend = "memory"

# Secret used to sign login tokens
login_secret = "secret"

# Database the services keep their collections in
database = "social-network"
"#
    }

    /// Check field values that serde cannot.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a non-hex or over-long machine id, a
    /// zero queue capacity or an unknown cache backend.
    pub fn validate(&self) -> Result<()> {
        if self.machine_id.is_empty()
            || self.machine_id.len() > 4
            || !self.machine_id.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(Error::invalid_argument(format!(
                "Invalid machine_id '{}' in {}. Expected up to 4 hex digits.",
                self.machine_id, CONFIG_FILE_NAME
            )));
        }
        if self.queue_capacity == 0 {
            return Err(Error::invalid_argument(format!(
                "queue_capacity in {} must be at least 1",
                CONFIG_FILE_NAME
            )));
        }
        if !CACHE_BACKENDS.contains(&self.cache_backend.as_str()) {
            return Err(Error::invalid_argument(format!(
                "Invalid cache_backend '{}' in {}. Expected one of {:?}.",
                self.cache_backend, CONFIG_FILE_NAME, CACHE_BACKENDS
            )));
        }
        Ok(())
    }

    /// Parse and validate config text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML or fails validation.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TrellisConfig = toml::from_str(content).map_err(|e| {
            Error::invalid_argument(format!("Failed to parse {}: {}", CONFIG_FILE_NAME, e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Io(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            Error::InvalidArgument(msg) => {
                Error::invalid_argument(format!("{} ({})", msg, path.display()))
            }
            other => other,
        })
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::Io(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::serialization(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::Io(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Namespace argument nodes for each field: `(node, value, doc)`
    pub fn node_values(&self) -> Vec<(&'static str, String, &'static str)> {
        vec![
            ("machine-id", self.machine_id.clone(), "hex machine id for post ids"),
            (
                "queue-capacity",
                self.queue_capacity.to_string(),
                "delivery queue capacity",
            ),
            ("cache-backend", self.cache_backend.clone(), "cache backend"),
            ("login-secret", self.login_secret.clone(), "login token secret"),
            ("database", self.database.clone(), "document database name"),
        ]
    }
}
