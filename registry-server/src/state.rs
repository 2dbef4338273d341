//! # Application State Management
//!
//! [`AppState`] holds the stores, the authorization gate and the unpublish
//! coordinator shared by every request handler. It is built once at startup
//! and handed to the router wrapped in an `Arc`.

use crate::auth::AuthGate;
use crate::blob::{BlobStore, LocalBlobStore, MemoryBlobStore};
use crate::config::{Config, StorageBackend};
use crate::error::{AppError, AppResult};
use crate::policy::UnpublishPolicy;
use crate::revision_store::{LocalRevisionStore, MemoryRevisionStore, RevisionStore};
use crate::unpublish::Unpublisher;
use std::sync::Arc;
use tracing::info;

/// Application state containing shared configuration and resources.
#[derive(Clone)]
pub struct AppState {
    /// Package documents
    pub revisions: Arc<dyn RevisionStore>,
    /// Tarballs
    pub blobs: Arc<dyn BlobStore>,
    pub auth: AuthGate,
    pub unpublisher: Unpublisher,
    /// Application configuration as loaded at startup
    pub config: Arc<Config>,
}

impl AppState {
    /// Assemble state around existing stores.
    pub fn new(
        revisions: Arc<dyn RevisionStore>,
        blobs: Arc<dyn BlobStore>,
        config: Config,
    ) -> Self {
        let policy = UnpublishPolicy::new(config.unpublish.remove_tarball);
        let unpublisher = Unpublisher::new(
            Arc::clone(&revisions),
            Arc::clone(&blobs),
            policy,
            config.unpublish.retry_policy(),
        );

        Self {
            revisions,
            blobs,
            auth: AuthGate::from_config(&config.security),
            unpublisher,
            config: Arc::new(config),
        }
    }

    /// Open the stores selected by `config.storage`.
    pub fn from_config(config: Config) -> AppResult<Self> {
        let (revisions, blobs): (Arc<dyn RevisionStore>, Arc<dyn BlobStore>) =
            match config.storage.backend {
                StorageBackend::Local => {
                    let revisions = LocalRevisionStore::open(config.storage.metadata_dir())?;
                    revisions.sweep_orphan_locks()?;
                    let blobs = LocalBlobStore::open(config.storage.tarball_dir())
                        .map_err(|e| AppError::InternalError(e.to_string()))?;
                    (Arc::new(revisions), Arc::new(blobs))
                }
                StorageBackend::Memory => (
                    Arc::new(MemoryRevisionStore::new()),
                    Arc::new(MemoryBlobStore::new()),
                ),
            };

        info!(
            revisions = revisions.name(),
            blobs = blobs.name(),
            data_dir = %config.storage.data_dir.display(),
            "Storage ready"
        );
        Ok(Self::new(revisions, blobs, config))
    }

    /// Shared tarball removal switch.
    pub fn policy(&self) -> &UnpublishPolicy {
        self.unpublisher.policy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_from_config_creates_local_layout() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = temp_dir.path().to_path_buf();
        config.unpublish.remove_tarball = false;

        let state = AppState::from_config(config).unwrap();
        assert_eq!(state.revisions.name(), "local");
        assert_eq!(state.blobs.name(), "local");
        assert!(temp_dir.path().join("metadata").is_dir());
        assert!(temp_dir.path().join("tarballs").is_dir());
        assert!(!state.policy().remove_tarball());
    }

    #[test]
    fn test_memory_backend() {
        let mut config = Config::default();
        config.storage.backend = StorageBackend::Memory;
        let state = AppState::from_config(config).unwrap();
        assert_eq!(state.revisions.name(), "memory");
        assert!(state.policy().remove_tarball());
    }
}
