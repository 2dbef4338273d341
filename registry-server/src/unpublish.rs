//! Version unpublish.
//!
//! Removing a version is a two step operation. The document is rewritten
//! first under check-and-set on its revision; only once that commit has
//! happened is the tarball deleted. A blob that cannot be deleted leaves an
//! orphan, which is reported as a warning on an otherwise successful outcome.
//! The metadata change is never reverted.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::auth::{AuthDenied, AuthGate, CallerRole};
use crate::blob::{delete_with_retry, BlobDeleteFailed, BlobError, BlobStore, RetryPolicy};
use crate::policy::UnpublishPolicy;
use crate::revision_store::{RevisionStore, StoreError};
use crate::types::{DocumentState, Revision};
use crate::validation::{parse_revision, parse_version, validate_package_name};

/// A request to remove one version of a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpublishRequest {
    pub package: String,
    pub version: String,
    /// Revision the caller last read; the removal only applies if it is
    /// still current.
    pub revision: String,
}

impl UnpublishRequest {
    pub fn new(
        package: impl Into<String>,
        version: impl Into<String>,
        revision: impl Into<String>,
    ) -> Self {
        Self {
            package: package.into(),
            version: version.into(),
            revision: revision.into(),
        }
    }
}

/// Internal detail behind a not-found outcome. Callers outside the process
/// only ever see a uniform "not found".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundReason {
    MalformedName,
    MalformedVersion,
    MalformedRevision,
    MissingPackage,
    MissingVersion,
}

impl NotFoundReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotFoundReason::MalformedName => "malformed_name",
            NotFoundReason::MalformedVersion => "malformed_version",
            NotFoundReason::MalformedRevision => "malformed_revision",
            NotFoundReason::MissingPackage => "missing_package",
            NotFoundReason::MissingVersion => "missing_version",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UnpublishError {
    #[error("document not found ({})", .0.as_str())]
    NotFound(NotFoundReason),

    #[error("revision conflict, current revision is {current}")]
    Conflict { current: Revision },

    #[error("authentication required")]
    Unauthenticated,

    #[error("admin privileges required")]
    Forbidden,

    #[error(transparent)]
    Store(StoreError),
}

impl From<AuthDenied> for UnpublishError {
    fn from(denied: AuthDenied) -> Self {
        match denied {
            AuthDenied::Unauthenticated => UnpublishError::Unauthenticated,
            AuthDenied::Forbidden => UnpublishError::Forbidden,
        }
    }
}

impl From<StoreError> for UnpublishError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::PackageNotFound(_) => {
                UnpublishError::NotFound(NotFoundReason::MissingPackage)
            }
            StoreError::VersionNotFound { .. } => {
                UnpublishError::NotFound(NotFoundReason::MissingVersion)
            }
            StoreError::Conflict { current, .. } => UnpublishError::Conflict { current },
            other => UnpublishError::Store(other),
        }
    }
}

/// What happened to the removed version's tarball.
#[derive(Debug)]
pub enum BlobCleanup {
    /// Deleted (or already absent)
    Deleted(String),
    /// Kept because tarball removal is switched off
    Retained(String),
    /// The version never referenced a blob
    NoBlob,
    /// Deletion gave up; the blob is orphaned
    Failed(BlobDeleteFailed),
}

impl BlobCleanup {
    pub fn is_failed(&self) -> bool {
        matches!(self, BlobCleanup::Failed(_))
    }
}

/// Result of a successful unpublish.
#[derive(Debug)]
pub struct UnpublishOutcome {
    pub package: String,
    pub version: String,
    pub state: DocumentState,
    pub blob: BlobCleanup,
}

impl UnpublishOutcome {
    /// New revision of the package, or `None` once the package is gone.
    pub fn revision(&self) -> Option<&Revision> {
        self.state.revision()
    }

    pub fn warning(&self) -> Option<String> {
        match &self.blob {
            BlobCleanup::Failed(failed) => Some(failed.to_string()),
            _ => None,
        }
    }
}

/// Runs unpublish requests against a revision store and a blob store.
#[derive(Clone)]
pub struct Unpublisher {
    revisions: Arc<dyn RevisionStore>,
    blobs: Arc<dyn BlobStore>,
    policy: UnpublishPolicy,
    retry: RetryPolicy,
}

impl Unpublisher {
    pub fn new(
        revisions: Arc<dyn RevisionStore>,
        blobs: Arc<dyn BlobStore>,
        policy: UnpublishPolicy,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            revisions,
            blobs,
            policy,
            retry,
        }
    }

    pub fn policy(&self) -> &UnpublishPolicy {
        &self.policy
    }

    /// Remove `request.version` from `request.package` on behalf of a caller
    /// with `role`.
    ///
    /// Malformed input is reported as not found before the caller's role is
    /// looked at, and neither malformed input nor a refused caller touches
    /// the store.
    pub async fn unpublish(
        &self,
        request: UnpublishRequest,
        role: CallerRole,
    ) -> Result<UnpublishOutcome, UnpublishError> {
        let UnpublishRequest {
            package,
            version,
            revision,
        } = request;

        let expected = Self::check_input(&package, &version, &revision)?;

        if let Err(denied) = AuthGate::authorize_unpublish(role) {
            info!(package = %package, version = %version, ?role, reason = %denied, "Unpublish refused");
            return Err(denied.into());
        }

        let removal = match self
            .revisions
            .remove_version(&package, &version, &expected)
            .await
        {
            Ok(removal) => removal,
            Err(e) => {
                let error = UnpublishError::from(e);
                info!(package = %package, version = %version, rev = %expected, error = %error, "Unpublish rejected by store");
                return Err(error);
            }
        };

        info!(
            package = %package,
            version = %version,
            rev = %expected,
            new_rev = %removal.state.revision().map(|r| r.to_string()).unwrap_or_default(),
            deleted = removal.state.is_deleted(),
            "Unpublished version"
        );

        let blob = match removal.record.tarball_key {
            None => BlobCleanup::NoBlob,
            Some(key) if !self.policy.remove_tarball() => {
                debug!(package = %package, version = %version, key = %key, "Tarball retained by policy");
                BlobCleanup::Retained(key)
            }
            Some(key) => self.delete_blob(key).await,
        };

        if let BlobCleanup::Failed(failed) = &blob {
            warn!(
                package = %package,
                version = %version,
                key = %failed.key,
                attempts = failed.attempts,
                error = %failed.last_error,
                "Tarball left orphaned after unpublish"
            );
        }

        Ok(UnpublishOutcome {
            package,
            version,
            state: removal.state,
            blob,
        })
    }

    fn check_input(
        package: &str,
        version: &str,
        revision: &str,
    ) -> Result<Revision, UnpublishError> {
        if let Err(e) = validate_package_name(package) {
            debug!(package = %package, error = %e, "Rejecting malformed package name");
            return Err(UnpublishError::NotFound(NotFoundReason::MalformedName));
        }
        if let Err(e) = parse_version(version) {
            debug!(package = %package, version = %version, error = %e, "Rejecting malformed version");
            return Err(UnpublishError::NotFound(NotFoundReason::MalformedVersion));
        }
        parse_revision(revision).map_err(|e| {
            debug!(package = %package, rev = %revision, error = %e, "Rejecting malformed revision");
            UnpublishError::NotFound(NotFoundReason::MalformedRevision)
        })
    }

    /// Delete a blob on its own task so it finishes even if the caller that
    /// committed the removal goes away.
    async fn delete_blob(&self, key: String) -> BlobCleanup {
        let blobs = Arc::clone(&self.blobs);
        let retry = self.retry.clone();
        let task_key = key.clone();
        let handle =
            tokio::spawn(async move { delete_with_retry(blobs.as_ref(), &task_key, &retry).await });

        match handle.await {
            Ok(Ok(())) => BlobCleanup::Deleted(key),
            Ok(Err(failed)) => BlobCleanup::Failed(failed),
            Err(join_error) => BlobCleanup::Failed(BlobDeleteFailed {
                key,
                attempts: 0,
                last_error: BlobError::Transient(format!("delete task failed: {join_error}")),
            }),
        }
    }
}
