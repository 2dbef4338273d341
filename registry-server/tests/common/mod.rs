//! Common test utilities and helpers

#![allow(dead_code)]

use anyhow::Result;
use axum::http::{header, HeaderName, HeaderValue};
use axum_test::TestServer;
use registry_server::blob::BlobStore;
use registry_server::config::Config;
use registry_server::revision_store::RevisionStore;
use registry_server::types::{PackageDocument, VersionRecord};
use registry_server::{build_router, AppState};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

pub const ADMIN_TOKEN: &str = "admin-token";
pub const USER_TOKEN: &str = "user-token";

/// Test server setup result
pub struct TestSetup {
    pub temp_dir: TempDir,
    pub state: Arc<AppState>,
    pub server: TestServer,
}

/// Config with one admin (`root`) and one ordinary user (`alice`), storing
/// everything under `data_dir`.
pub fn test_config(data_dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.storage.data_dir = data_dir.to_path_buf();
    config.security.tokens = HashMap::from([
        (ADMIN_TOKEN.to_string(), "root".to_string()),
        (USER_TOKEN.to_string(), "alice".to_string()),
    ]);
    config.security.admins = vec!["root".to_string()];
    config.unpublish.initial_backoff_ms = 1;
    config.unpublish.max_backoff_ms = 2;
    config
}

/// Local stores in a temporary directory behind an in-process HTTP server.
pub fn create_test_setup() -> Result<TestSetup> {
    let temp_dir = TempDir::new()?;
    let state = Arc::new(AppState::from_config(test_config(temp_dir.path()))?);
    let server = TestServer::new(build_router(Arc::clone(&state)))?;
    Ok(TestSetup {
        temp_dir,
        state,
        server,
    })
}

/// Tarball filename npm uses for `name@version`.
pub fn tarball_filename(name: &str, version: &str) -> String {
    let unscoped = name.rsplit('/').next().unwrap_or(name);
    format!("{unscoped}-{version}.tgz")
}

/// Publish `versions` of `name` in order, storing a tarball for each.
///
/// Manifests carry only `dist.tarball`, so blob keys are derived from the
/// tarball URL.
pub async fn publish(state: &AppState, name: &str, versions: &[&str]) -> Result<PackageDocument> {
    let mut current: Option<PackageDocument> = state.revisions.get(name).await.ok();
    for version in versions {
        let filename = tarball_filename(name, version);
        let manifest = json!({
            "name": name,
            "version": version,
            "dist": { "tarball": format!("http://localhost:7001/npm/{name}/-/{filename}") },
        });
        let record = VersionRecord::from_manifest(name, &manifest)
            .ok_or_else(|| anyhow::anyhow!("manifest without version"))?;
        if let Some(key) = &record.tarball_key {
            state.blobs.put(key, b"tarball bytes".to_vec()).await?;
        }
        let expected = current.as_ref().map(|doc| doc.revision.clone());
        current = Some(
            state
                .revisions
                .add_version(name, record, expected.as_ref())
                .await?,
        );
    }
    current.ok_or_else(|| anyhow::anyhow!("nothing published"))
}

/// Blob key derived for `name@version` by [`publish`].
pub fn blob_key(name: &str, version: &str) -> String {
    format!("/{name}/-/{}", tarball_filename(name, version))
}

pub fn unpublish_path(name: &str, version: &str, rev: &str) -> String {
    let filename = tarball_filename(name, version);
    match name.split_once('/') {
        Some((scope, _)) => format!("/npm/{name}/download/{scope}/{filename}/-rev/{rev}"),
        None => format!("/npm/{name}/download/{filename}/-rev/{rev}"),
    }
}

pub fn bearer(token: &str) -> (HeaderName, HeaderValue) {
    (
        header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}")).expect("valid header value"),
    )
}
