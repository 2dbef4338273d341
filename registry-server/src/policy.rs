//! Runtime unpublish policy.
//!
//! The tarball cleanup switch is read on every unpublish call. When the
//! server runs with a config file, [`start_config_watcher`] re-reads the file
//! whenever it changes and updates the shared switch, so operators can stop
//! (or resume) tarball removal without a restart.

use notify::{Event, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::AppResult;

/// Shared handle to the tarball cleanup switch.
#[derive(Debug, Clone)]
pub struct UnpublishPolicy {
    remove_tarball: Arc<AtomicBool>,
}

impl UnpublishPolicy {
    pub fn new(remove_tarball: bool) -> Self {
        Self {
            remove_tarball: Arc::new(AtomicBool::new(remove_tarball)),
        }
    }

    /// Whether a successful unpublish should also delete the tarball.
    pub fn remove_tarball(&self) -> bool {
        self.remove_tarball.load(Ordering::SeqCst)
    }

    pub fn set_remove_tarball(&self, enabled: bool) {
        let previous = self.remove_tarball.swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            info!(remove_tarball = enabled, "Unpublish tarball policy changed");
        }
    }
}

impl Default for UnpublishPolicy {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Re-read `path` and apply its `unpublish.remove_tarball` setting.
///
/// Returns the value now in effect.
pub fn reload_policy(path: &Path, policy: &UnpublishPolicy) -> AppResult<bool> {
    let config = Config::load(path)?;
    policy.set_remove_tarball(config.unpublish.remove_tarball);
    Ok(config.unpublish.remove_tarball)
}

/// Watch the config file and keep `policy` in sync with it.
///
/// The parent directory is watched rather than the file itself so editors
/// that replace the file on save are still picked up. A file that fails to
/// parse leaves the current policy in place.
pub fn start_config_watcher(path: PathBuf, policy: UnpublishPolicy) -> anyhow::Result<()> {
    let (tx, rx) = std::sync::mpsc::channel();
    let file_name = path
        .file_name()
        .map(|name| name.to_os_string())
        .ok_or_else(|| anyhow::anyhow!("config path has no file name: {}", path.display()))?;
    let watch_dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
        if let Ok(event) = res {
            if event.kind.is_modify() || event.kind.is_create() {
                let touches_config = event
                    .paths
                    .iter()
                    .any(|changed| changed.file_name() == Some(file_name.as_os_str()));
                if touches_config {
                    let _ = tx.send(());
                }
            }
        }
    })?;

    watcher.watch(&watch_dir, RecursiveMode::NonRecursive)?;

    std::thread::spawn(move || {
        let _watcher = watcher;
        while rx.recv().is_ok() {
            match reload_policy(&path, &policy) {
                Ok(enabled) => {
                    info!(config = %path.display(), remove_tarball = enabled, "Config reloaded")
                }
                Err(e) => {
                    warn!(config = %path.display(), error = %e, "Ignoring unreadable config change")
                }
            }
        }
    });

    info!(dir = %watch_dir.display(), "Config watcher started");
    Ok(())
}
