use super::{BlobError, BlobResult, BlobStore};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Filesystem blob store.
///
/// Keys are relative paths below `root`; a leading `/` is ignored so npm
/// style keys such as `/pkg/-/pkg-1.0.0.tgz` map to `root/pkg/-/pkg-1.0.0.tgz`.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn open(root: impl Into<PathBuf>) -> BlobResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to a path, rejecting anything that could escape `root`.
    fn blob_path(&self, key: &str) -> BlobResult<PathBuf> {
        let relative = Path::new(key.trim_start_matches('/'));
        if relative.as_os_str().is_empty() || key.contains('\0') || key.contains('\\') {
            return Err(BlobError::InvalidKey(key.to_string()));
        }
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(BlobError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> BlobResult<()> {
        let path = self.blob_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, &data).await?;
        info!(key = %key, size = data.len(), "Blob saved");
        Ok(())
    }

    async fn exists(&self, key: &str) -> BlobResult<bool> {
        let path = self.blob_path(key)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        let path = self.blob_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(key = %key, path = %path.display(), "Blob file removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(key = %key, "Blob already absent");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_and_delete_npm_key() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalBlobStore::open(temp_dir.path().join("tarballs")).unwrap();
        let key = "/@scope/pkg/-/pkg-1.0.0.tgz";

        store.put(key, b"tarball".to_vec()).await.unwrap();
        assert!(store.root().join("@scope/pkg/-/pkg-1.0.0.tgz").exists());
        assert!(store.exists(key).await.unwrap());

        store.delete(key).await.unwrap();
        assert!(!store.exists(key).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_missing_blob_is_ok() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalBlobStore::open(temp_dir.path()).unwrap();
        store.delete("/pkg/-/pkg-9.9.9.tgz").await.unwrap();
        store.delete("/pkg/-/pkg-9.9.9.tgz").await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalBlobStore::open(temp_dir.path().join("tarballs")).unwrap();
        for key in ["", "/", "../outside.tgz", "/pkg/../../etc/passwd", "a\\b.tgz", "./x"] {
            assert!(
                matches!(store.delete(key).await, Err(BlobError::InvalidKey(_))),
                "{key:?} should be rejected"
            );
        }
    }
}
