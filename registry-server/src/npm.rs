//! npm registry routes: package documents and version unpublish.
//!
//! The unpublish route follows the npm client's shape, naming the version
//! through its tarball filename and carrying the document revision the
//! client last saw:
//!
//! ```text
//! DELETE /npm/pkg/download/pkg-1.0.0.tgz/-rev/3-0a1b2c3d4e5f
//! DELETE /npm/@scope/pkg/download/@scope/pkg-1.0.0.tgz/-rev/3-0a1b2c3d4e5f
//! ```

use axum::{
    extract::{Path as AxumPath, State},
    http::HeaderMap,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::auth::Credentials;
use crate::error::AppResult;
use crate::state::AppState;
use crate::types::PackageDocument;
use crate::unpublish::{NotFoundReason, UnpublishError, UnpublishOutcome, UnpublishRequest};
use crate::validation::version_from_filename;

/// Body returned by a successful unpublish.
#[derive(Debug, Serialize, PartialEq)]
pub struct UnpublishResponse {
    pub ok: bool,
    /// New revision, or `null` once the package is gone
    pub rev: Option<String>,
    /// Whether the package document was deleted
    pub deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl From<&UnpublishOutcome> for UnpublishResponse {
    fn from(outcome: &UnpublishOutcome) -> Self {
        Self {
            ok: true,
            rev: outcome.revision().map(|rev| rev.to_string()),
            deleted: outcome.state.is_deleted(),
            warning: outcome.warning(),
        }
    }
}

/// Serve a package document.
pub async fn package_metadata(
    AxumPath(package): AxumPath<String>,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<PackageDocument>> {
    debug!(package = %package, "Incoming npm metadata request");
    let doc = state.revisions.get(&package).await?;
    Ok(Json(doc))
}

/// Serve a scoped package document, `/npm/@scope/name`.
pub async fn scoped_package_metadata(
    AxumPath((scope, package)): AxumPath<(String, String)>,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<PackageDocument>> {
    package_metadata(AxumPath(format!("{scope}/{package}")), State(state)).await
}

/// Remove one version of an unscoped package.
pub async fn unpublish_version(
    AxumPath((package, filename, rev)): AxumPath<(String, String, String)>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<UnpublishResponse>> {
    unpublish(&state, &headers, package, &filename, rev).await
}

/// Remove one version of a scoped package.
///
/// The filename segment repeats the scope; a mismatch is treated as an
/// unknown document.
pub async fn scoped_unpublish_version(
    AxumPath((scope, package, file_scope, filename, rev)): AxumPath<(
        String,
        String,
        String,
        String,
        String,
    )>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<UnpublishResponse>> {
    if file_scope != scope {
        debug!(scope = %scope, file_scope = %file_scope, "Download scope does not match package scope");
        return Err(UnpublishError::NotFound(NotFoundReason::MalformedName).into());
    }
    unpublish(&state, &headers, format!("{scope}/{package}"), &filename, rev).await
}

async fn unpublish(
    state: &AppState,
    headers: &HeaderMap,
    package: String,
    filename: &str,
    rev: String,
) -> AppResult<Json<UnpublishResponse>> {
    debug!(package = %package, filename = %filename, rev = %rev, "Incoming npm unpublish request");

    let Some(version) = version_from_filename(&package, filename) else {
        debug!(package = %package, filename = %filename, "Filename does not name a version of this package");
        return Err(UnpublishError::NotFound(NotFoundReason::MalformedVersion).into());
    };

    let role = state.auth.classify(&Credentials::from_headers(headers));
    let request = UnpublishRequest::new(package, version, rev);
    let outcome = state.unpublisher.unpublish(request, role).await?;

    info!(
        package = %outcome.package,
        version = %outcome.version,
        deleted = outcome.state.is_deleted(),
        "npm unpublish completed"
    );
    Ok(Json(UnpublishResponse::from(&outcome)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::{BlobDeleteFailed, BlobError};
    use crate::unpublish::BlobCleanup;
    use crate::types::{DocumentState, Revision, VersionRecord};
    use serde_json::json;

    fn outcome(state: DocumentState, blob: BlobCleanup) -> UnpublishOutcome {
        UnpublishOutcome {
            package: "p".to_string(),
            version: "1.0.0".to_string(),
            state,
            blob,
        }
    }

    #[test]
    fn test_response_for_deleted_package() {
        let body = UnpublishResponse::from(&outcome(DocumentState::Deleted, BlobCleanup::NoBlob));
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"ok": true, "rev": null, "deleted": true})
        );
    }

    #[test]
    fn test_response_carries_new_revision_and_warning() {
        let doc = PackageDocument::new("p", VersionRecord::new("2.0.0", None));
        let rev: Revision = doc.revision.clone();
        let failed = BlobDeleteFailed {
            key: "k1".to_string(),
            attempts: 3,
            last_error: BlobError::Transient("down".to_string()),
        };

        let body = UnpublishResponse::from(&outcome(
            DocumentState::Updated(doc),
            BlobCleanup::Failed(failed),
        ));
        assert_eq!(body.rev, Some(rev.to_string()));
        assert!(!body.deleted);
        assert!(body.warning.unwrap().contains("k1"));
    }
}
