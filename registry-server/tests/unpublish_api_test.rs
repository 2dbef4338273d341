//! End-to-end tests for the npm unpublish routes.

mod common;

use axum::http::StatusCode;
use registry_server::blob::BlobStore;
use registry_server::revision_store::RevisionStore;
use common::{
    bearer, blob_key, create_test_setup, publish, unpublish_path, ADMIN_TOKEN, USER_TOKEN,
};
use serde_json::{json, Value};

const NOT_FOUND_BODY: &str = "[not_found] document not found";

#[tokio::test]
async fn test_malformed_version_filename_is_404() {
    let setup = create_test_setup().unwrap();
    let doc = publish(&setup.state, "testmodule-remove-1", &["0.0.1"])
        .await
        .unwrap();
    let (name, value) = bearer(ADMIN_TOKEN);

    let response = setup
        .server
        .delete(&format!(
            "/npm/testmodule-remove-1/download/testmodule-remove-1-abc.tgz/-rev/{}",
            doc.revision
        ))
        .add_header(name, value)
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body, json!({"error": NOT_FOUND_BODY, "reason": NOT_FOUND_BODY}));
}

#[tokio::test]
async fn test_malformed_revision_is_404_even_without_auth() {
    let setup = create_test_setup().unwrap();
    publish(&setup.state, "testmodule-remove-1", &["0.0.1"])
        .await
        .unwrap();

    let response = setup
        .server
        .delete(&unpublish_path("testmodule-remove-1", "0.0.1", "abc"))
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["error"], NOT_FOUND_BODY);
}

#[tokio::test]
async fn test_filename_for_other_package_is_404() {
    let setup = create_test_setup().unwrap();
    let doc = publish(&setup.state, "left", &["1.0.0"]).await.unwrap();
    let (name, value) = bearer(ADMIN_TOKEN);

    let response = setup
        .server
        .delete(&format!(
            "/npm/left/download/right-1.0.0.tgz/-rev/{}",
            doc.revision
        ))
        .add_header(name, value)
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
    assert!(setup.state.revisions.get("left").await.is_ok());
}

#[tokio::test]
async fn test_missing_auth_is_401() {
    let setup = create_test_setup().unwrap();
    let doc = publish(&setup.state, "testmodule-remove-1", &["0.0.1"])
        .await
        .unwrap();

    let response = setup
        .server
        .delete(&unpublish_path(
            "testmodule-remove-1",
            "0.0.1",
            &doc.revision.to_string(),
        ))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["error"], "[unauthorized] Login first");
}

#[tokio::test]
async fn test_non_admin_is_403_and_document_is_untouched() {
    let setup = create_test_setup().unwrap();
    let doc = publish(&setup.state, "testmodule-remove-1", &["0.0.1"])
        .await
        .unwrap();
    let (name, value) = bearer(USER_TOKEN);

    let response = setup
        .server
        .delete(&unpublish_path(
            "testmodule-remove-1",
            "0.0.1",
            &doc.revision.to_string(),
        ))
        .add_header(name, value)
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
    let current = setup
        .state
        .revisions
        .get("testmodule-remove-1")
        .await
        .unwrap();
    assert_eq!(current, doc);
}

#[tokio::test]
async fn test_admin_removes_versions_until_package_is_gone() {
    let setup = create_test_setup().unwrap();
    let doc = publish(&setup.state, "p", &["1.0.0", "2.0.0"]).await.unwrap();
    let tarball_1 = blob_key("p", "1.0.0");
    let tarball_2 = blob_key("p", "2.0.0");
    let (name, value) = bearer(ADMIN_TOKEN);

    let response = setup
        .server
        .delete(&unpublish_path("p", "1.0.0", &doc.revision.to_string()))
        .add_header(name.clone(), value.clone())
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["ok"], true);
    assert_eq!(body["deleted"], false);
    let r2 = body["rev"].as_str().unwrap().to_string();
    assert_ne!(r2, doc.revision.to_string());
    assert!(body.get("warning").is_none());
    assert!(!setup.state.blobs.exists(&tarball_1).await.unwrap());
    assert!(setup.state.blobs.exists(&tarball_2).await.unwrap());

    let metadata: Value = setup.server.get("/npm/p").await.json();
    assert_eq!(metadata["_rev"], r2.as_str());
    assert_eq!(metadata["dist-tags"], json!({"latest": "2.0.0"}));
    assert!(metadata["versions"].get("1.0.0").is_none());

    let response = setup
        .server
        .delete(&unpublish_path("p", "2.0.0", &r2))
        .add_header(name, value)
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body, json!({"ok": true, "rev": null, "deleted": true}));
    assert!(!setup.state.blobs.exists(&tarball_2).await.unwrap());

    setup
        .server
        .get("/npm/p")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stale_revision_is_409() {
    let setup = create_test_setup().unwrap();
    let first = publish(&setup.state, "p", &["1.0.0"]).await.unwrap();
    let latest = publish(&setup.state, "p", &["2.0.0"]).await.unwrap();
    let (name, value) = bearer(ADMIN_TOKEN);

    let response = setup
        .server
        .delete(&unpublish_path("p", "1.0.0", &first.revision.to_string()))
        .add_header(name, value)
        .await;

    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(setup.state.revisions.get("p").await.unwrap(), latest);
}

#[tokio::test]
async fn test_repeat_delete_with_original_revision_is_404() {
    let setup = create_test_setup().unwrap();
    let doc = publish(&setup.state, "p", &["1.0.0", "2.0.0"]).await.unwrap();
    let path = unpublish_path("p", "1.0.0", &doc.revision.to_string());
    let (name, value) = bearer(ADMIN_TOKEN);

    setup
        .server
        .delete(&path)
        .add_header(name.clone(), value.clone())
        .await
        .assert_status_ok();

    let response = setup.server.delete(&path).add_header(name, value).await;
    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body, json!({"error": NOT_FOUND_BODY, "reason": NOT_FOUND_BODY}));
}

#[tokio::test]
async fn test_tarball_kept_when_policy_disabled() {
    let setup = create_test_setup().unwrap();
    setup.state.policy().set_remove_tarball(false);
    let doc = publish(&setup.state, "testmodule-remove-2", &["1.0.0"])
        .await
        .unwrap();
    let (name, value) = bearer(ADMIN_TOKEN);

    let response = setup
        .server
        .delete(&unpublish_path(
            "testmodule-remove-2",
            "1.0.0",
            &doc.revision.to_string(),
        ))
        .add_header(name, value)
        .await;

    response.assert_status_ok();
    assert!(setup
        .state
        .blobs
        .exists(&blob_key("testmodule-remove-2", "1.0.0"))
        .await
        .unwrap());
    setup
        .server
        .get("/npm/testmodule-remove-2")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_scoped_package_unpublish() {
    let setup = create_test_setup().unwrap();
    let doc = publish(&setup.state, "@cnpmtest/remove", &["1.0.0", "1.1.0"])
        .await
        .unwrap();
    let (name, value) = bearer(ADMIN_TOKEN);

    let response = setup
        .server
        .delete(&unpublish_path(
            "@cnpmtest/remove",
            "1.1.0",
            &doc.revision.to_string(),
        ))
        .add_header(name, value)
        .await;
    response.assert_status_ok();

    let metadata: Value = setup.server.get("/npm/@cnpmtest/remove").await.json();
    assert_eq!(metadata["name"], "@cnpmtest/remove");
    assert_eq!(metadata["dist-tags"]["latest"], "1.0.0");
    assert!(!setup
        .state
        .blobs
        .exists(&blob_key("@cnpmtest/remove", "1.1.0"))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_scoped_filename_with_wrong_scope_is_404() {
    let setup = create_test_setup().unwrap();
    let doc = publish(&setup.state, "@cnpmtest/remove", &["1.0.0"])
        .await
        .unwrap();
    let (name, value) = bearer(ADMIN_TOKEN);

    let response = setup
        .server
        .delete(&format!(
            "/npm/@cnpmtest/remove/download/@other/remove-1.0.0.tgz/-rev/{}",
            doc.revision
        ))
        .add_header(name, value)
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health() {
    let setup = create_test_setup().unwrap();
    let response = setup.server.get("/health").await;
    response.assert_status_ok();
    response.assert_json(&json!({"status": "healthy"}));
}
