//! # Configuration Management
//!
//! Configuration for the registry server, loaded from a JSON file with
//! defaults for every section that is omitted:
//!
//! - [`ServerConfig`]: bind host and port
//! - [`StorageConfig`]: data directory and storage backend
//! - [`SecurityConfig`]: API tokens and administrator list
//! - [`UnpublishConfig`]: tarball cleanup switch and blob delete retries
//!
//! ```json
//! {
//!   "server": { "host": "127.0.0.1", "port": 7001 },
//!   "storage": { "data_dir": "./data", "backend": "local" },
//!   "security": {
//!     "tokens": { "s3cr3t": "root", "t0ken": "alice" },
//!     "admins": ["root"]
//!   },
//!   "unpublish": { "remove_tarball": true, "blob_delete_attempts": 3 }
//! }
//! ```

use crate::blob::RetryPolicy;
use crate::error::AppResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for the registry server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Network settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Where documents and tarballs live
    #[serde(default)]
    pub storage: StorageConfig,
    /// Token to user mapping and administrators
    #[serde(default)]
    pub security: SecurityConfig,
    /// Unpublish behaviour
    #[serde(default)]
    pub unpublish: UnpublishConfig,
}

/// Server configuration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host/IP address to bind to
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7001,
        }
    }
}

/// Which revision/blob store implementation to run with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// JSON documents and tarball files under `data_dir`
    #[default]
    Local,
    /// Process memory; everything is lost on restart
    Memory,
}

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base directory for all registry data
    pub data_dir: PathBuf,
    #[serde(default)]
    pub backend: StorageBackend,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            backend: StorageBackend::Local,
        }
    }
}

impl StorageConfig {
    /// Directory holding package documents.
    pub fn metadata_dir(&self) -> PathBuf {
        self.data_dir.join("metadata")
    }

    /// Directory holding tarball blobs.
    pub fn tarball_dir(&self) -> PathBuf {
        self.data_dir.join("tarballs")
    }
}

/// Security configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// API token -> user name
    #[serde(default)]
    pub tokens: HashMap<String, String>,
    /// Users allowed to unpublish
    #[serde(default)]
    pub admins: Vec<String>,
}

/// Unpublish configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnpublishConfig {
    /// Delete the tarball after its version is unpublished
    pub remove_tarball: bool,
    pub blob_delete_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for UnpublishConfig {
    fn default() -> Self {
        Self {
            remove_tarball: true,
            blob_delete_attempts: 3,
            initial_backoff_ms: 50,
            max_backoff_ms: 1000,
        }
    }
}

impl UnpublishConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.blob_delete_attempts.max(1),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms.max(self.initial_backoff_ms)),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or does not match the expected shape.
    pub fn load<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config_str = fs::read_to_string(path)?;
        let config = serde_json::from_str(&config_str)?;
        Ok(config)
    }
}
