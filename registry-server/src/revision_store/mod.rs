//! # Revision Store
//!
//! Package documents keyed by name, guarded by optimistic concurrency. Every
//! mutation names the [`Revision`] the caller last saw; the store applies it
//! only if that is still the current revision, in one indivisible
//! check-and-set step, and mints a fresh revision for the result.
//!
//! ## Implementations
//!
//! - [`MemoryRevisionStore`]: in-process map, used by tests and ephemeral servers
//! - [`LocalRevisionStore`]: one JSON file per package with advisory file locks
//!
//! Both share [`plan_removal`] and [`plan_addition`] so the revision and
//! cascade rules are defined exactly once.

mod local;
mod memory;

pub use local::LocalRevisionStore;
pub use memory::MemoryRevisionStore;

use crate::types::{DocumentState, PackageDocument, Removal, Revision, VersionRecord};
use async_trait::async_trait;

/// Errors reported by a revision store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("package not found: {0}")]
    PackageNotFound(String),

    #[error("version {version} of {name} not found")]
    VersionNotFound { name: String, version: String },

    #[error("revision conflict on {name}: current revision is {current}")]
    Conflict { name: String, current: Revision },

    #[error("version {version} of {name} already exists")]
    AlreadyExists { name: String, version: String },

    #[error("invalid version record: {0}")]
    InvalidRecord(String),

    #[error("corrupt document {name}: {reason}")]
    Corrupt { name: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    /// True for a missing document or a missing version.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::PackageNotFound(_) | StoreError::VersionNotFound { .. }
        )
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Document storage with check-and-set mutations.
#[async_trait]
pub trait RevisionStore: Send + Sync {
    /// Backend identifier used in logs
    fn name(&self) -> &'static str;

    /// Fetch the current document.
    async fn get(&self, name: &str) -> StoreResult<PackageDocument>;

    /// Remove one version if `expected` is still the current revision.
    ///
    /// Removing the last version deletes the document and reports
    /// [`DocumentState::Deleted`].
    async fn remove_version(
        &self,
        name: &str,
        version: &str,
        expected: &Revision,
    ) -> StoreResult<Removal>;

    /// Add a version; `expected = None` creates the document.
    async fn add_version(
        &self,
        name: &str,
        record: VersionRecord,
        expected: Option<&Revision>,
    ) -> StoreResult<PackageDocument>;

    /// Names of every stored package, sorted.
    async fn list_names(&self) -> StoreResult<Vec<String>>;
}

/// Compute the result of removing `version` from `doc`.
///
/// Returns the removal report and the document to persist, or `None` when
/// the document must be deleted because no versions remain.
///
/// A version that is already gone is `VersionNotFound` whatever revision the
/// caller holds; the revision is only compared for versions still present.
pub(crate) fn plan_removal(
    mut doc: PackageDocument,
    version: &str,
    expected: &Revision,
) -> StoreResult<(Removal, Option<PackageDocument>)> {
    if !doc.versions.contains_key(version) {
        return Err(StoreError::VersionNotFound {
            name: doc.name,
            version: version.to_string(),
        });
    }

    if &doc.revision != expected {
        return Err(StoreError::Conflict {
            name: doc.name,
            current: doc.revision,
        });
    }

    let record = doc
        .remove_version(version)
        .ok_or_else(|| StoreError::VersionNotFound {
            name: doc.name.clone(),
            version: version.to_string(),
        })?;

    if doc.versions.is_empty() {
        return Ok((
            Removal {
                record,
                state: DocumentState::Deleted,
            },
            None,
        ));
    }

    doc.revision = doc.revision.next();
    Ok((
        Removal {
            record,
            state: DocumentState::Updated(doc.clone()),
        },
        Some(doc),
    ))
}

/// Compute the document produced by adding `record`.
pub(crate) fn plan_addition(
    existing: Option<PackageDocument>,
    name: &str,
    record: VersionRecord,
    expected: Option<&Revision>,
) -> StoreResult<PackageDocument> {
    if semver::Version::parse(&record.version).is_err() {
        return Err(StoreError::InvalidRecord(format!(
            "'{}' is not a semantic version",
            record.version
        )));
    }

    match (existing, expected) {
        (None, None) => Ok(PackageDocument::new(name, record)),
        (None, Some(_)) => Err(StoreError::PackageNotFound(name.to_string())),
        (Some(doc), None) => Err(StoreError::Conflict {
            name: doc.name,
            current: doc.revision,
        }),
        (Some(mut doc), Some(expected)) => {
            if &doc.revision != expected {
                return Err(StoreError::Conflict {
                    name: doc.name,
                    current: doc.revision,
                });
            }
            let version = record.version.clone();
            if !doc.insert_version(record) {
                return Err(StoreError::AlreadyExists {
                    name: doc.name,
                    version,
                });
            }
            doc.revision = doc.revision.next();
            Ok(doc)
        }
    }
}
