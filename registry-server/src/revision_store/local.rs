use super::{plan_addition, plan_removal, RevisionStore, StoreError, StoreResult};
use crate::types::{PackageDocument, Removal, Revision, VersionRecord};
use crate::validation::validate_package_name;
use async_trait::async_trait;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Filesystem revision store.
///
/// Layout under `root`:
///
/// - `{name}.json`: the document, with `/` in scoped names written as `%2f`
/// - `{name}.json.lock`: advisory lock file serialising check-and-set
///
/// Mutations take an exclusive lock, re-read the document, apply the
/// revision check and replace the file through a rename. The whole sequence
/// runs on a blocking thread, so dropping the caller's future cannot stop
/// it half way.
///
/// Lock files outlive the document they guard: unlinking one while another
/// writer waits on it would let two writers hold different inodes. They are
/// reclaimed at server startup by [`LocalRevisionStore::sweep_orphan_locks`].
#[derive(Debug, Clone)]
pub struct LocalRevisionStore {
    root: PathBuf,
}

impl LocalRevisionStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        debug!(root = %root.display(), "Opened local revision store");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Remove lock files whose document no longer exists.
    ///
    /// A lock currently held by another process is left alone. Returns the
    /// number of files removed.
    pub fn sweep_orphan_locks(&self) -> StoreResult<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.root)? {
            let lock_path = entry?.path();
            let Some(doc_name) = lock_path
                .file_name()
                .and_then(|f| f.to_str())
                .and_then(|f| f.strip_suffix(".lock"))
                .filter(|f| f.ends_with(".json"))
            else {
                continue;
            };
            let doc_path = self.root.join(doc_name);
            if doc_path.exists() {
                continue;
            }

            let file = match OpenOptions::new().write(true).open(&lock_path) {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if file.try_lock_exclusive().is_err() {
                continue;
            }
            if !doc_path.exists() {
                fs::remove_file(&lock_path)?;
                removed += 1;
            }
            let _ = FileExt::unlock(&file);
        }

        if removed > 0 {
            debug!(root = %self.root.display(), removed, "Removed orphan lock files");
        }
        Ok(removed)
    }

    fn document_path(&self, name: &str) -> StoreResult<PathBuf> {
        validate_package_name(name).map_err(|_| StoreError::PackageNotFound(name.to_string()))?;
        Ok(self.root.join(format!("{}.json", encode_name(name))))
    }

    async fn run_blocking<T, F>(f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> StoreResult<T> + Send + 'static,
    {
        tokio::task::spawn_blocking(f)
            .await
            .map_err(|e| StoreError::Backend(format!("store task failed: {e}")))?
    }
}

fn encode_name(name: &str) -> String {
    name.replace('/', "%2f")
}

fn decode_name(file_stem: &str) -> String {
    file_stem.replace("%2f", "/")
}

/// Exclusive advisory lock held for the duration of one mutation.
struct DocumentLock {
    file: File,
}

impl DocumentLock {
    fn acquire(doc_path: &Path) -> StoreResult<Self> {
        let lock_path = doc_path.with_extension("json.lock");
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;
        file.lock_exclusive()?;
        Ok(Self { file })
    }
}

impl Drop for DocumentLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn read_document(path: &Path, name: &str) -> StoreResult<Option<PackageDocument>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let doc: PackageDocument = serde_json::from_str(&content)?;
    if doc.name != name {
        return Err(StoreError::Corrupt {
            name: name.to_string(),
            reason: format!("file holds document for '{}'", doc.name),
        });
    }
    if doc.versions.is_empty() {
        return Err(StoreError::Corrupt {
            name: name.to_string(),
            reason: "document has no versions".to_string(),
        });
    }
    Ok(Some(doc))
}

fn write_document(path: &Path, doc: &PackageDocument) -> StoreResult<()> {
    let tmp_path = path.with_extension("json.tmp");
    let content = serde_json::to_vec_pretty(doc)?;

    let mut tmp = File::create(&tmp_path)?;
    tmp.write_all(&content)?;
    tmp.sync_all()?;
    drop(tmp);

    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[async_trait]
impl RevisionStore for LocalRevisionStore {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn get(&self, name: &str) -> StoreResult<PackageDocument> {
        let path = self.document_path(name)?;
        let name = name.to_string();
        Self::run_blocking(move || {
            read_document(&path, &name)?.ok_or(StoreError::PackageNotFound(name))
        })
        .await
    }

    async fn remove_version(
        &self,
        name: &str,
        version: &str,
        expected: &Revision,
    ) -> StoreResult<Removal> {
        let path = self.document_path(name)?;
        let name = name.to_string();
        let version = version.to_string();
        let expected = expected.clone();

        Self::run_blocking(move || {
            let _lock = DocumentLock::acquire(&path)?;
            let doc = read_document(&path, &name)?
                .ok_or_else(|| StoreError::PackageNotFound(name.clone()))?;

            let (removal, next) = plan_removal(doc, &version, &expected)?;
            match next {
                Some(doc) => {
                    write_document(&path, &doc)?;
                    debug!(package = %name, version = %version, rev = %doc.revision, "Wrote reduced document");
                }
                None => {
                    fs::remove_file(&path)?;
                    info!(package = %name, "Removed document file (no versions remaining)");
                }
            }
            Ok(removal)
        })
        .await
    }

    async fn add_version(
        &self,
        name: &str,
        record: VersionRecord,
        expected: Option<&Revision>,
    ) -> StoreResult<PackageDocument> {
        let path = self.document_path(name)?;
        let name = name.to_string();
        let expected = expected.cloned();

        Self::run_blocking(move || {
            let _lock = DocumentLock::acquire(&path)?;
            let existing = read_document(&path, &name)?;
            let doc = plan_addition(existing, &name, record, expected.as_ref())?;
            write_document(&path, &doc)?;
            Ok(doc)
        })
        .await
    }

    async fn list_names(&self) -> StoreResult<Vec<String>> {
        let root = self.root.clone();
        Self::run_blocking(move || {
            let mut names = Vec::new();
            for entry in fs::read_dir(&root)? {
                let entry = entry?;
                let file_name = entry.file_name();
                if let Some(stem) = file_name.to_str().and_then(|f| f.strip_suffix(".json")) {
                    names.push(decode_name(stem));
                }
            }
            names.sort();
            Ok(names)
        })
        .await
    }
}
