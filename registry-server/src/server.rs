//! HTTP server setup and routing

use anyhow::Result;
use axum::{
    response::IntoResponse,
    routing::{delete, get},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::npm;
use crate::policy::start_config_watcher;
use crate::state::AppState;

/// Build the application router.
///
/// For scoped packages the first `{package}` segment holds the `@scope`
/// part; handlers read path segments by position.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/npm/{package}", get(npm::package_metadata))
        .route("/npm/{package}/{name}", get(npm::scoped_package_metadata))
        .route(
            "/npm/{package}/download/{filename}/-rev/{rev}",
            delete(npm::unpublish_version),
        )
        .route(
            "/npm/{package}/{name}/download/{file_scope}/{filename}/-rev/{rev}",
            delete(npm::scoped_unpublish_version),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the registry until the listener fails.
///
/// With `config_path` set, edits to that file update the tarball removal
/// policy of the running server.
pub async fn run_server(config: Config, config_path: Option<PathBuf>) -> Result<()> {
    info!("Starting registry server");

    let host = config.server.host.clone();
    let port = config.server.port;
    let addr: SocketAddr = format!("{}:{}", host, port).parse().map_err(|e| {
        error!(host = %host, port = %port, error = %e, "Invalid socket address");
        anyhow::anyhow!("Invalid socket address {}:{}: {}", host, port, e)
    })?;

    let state = AppState::from_config(config)?;
    if let Some(path) = config_path {
        if let Err(e) = start_config_watcher(path.clone(), state.policy().clone()) {
            warn!(config = %path.display(), error = %e, "Config watcher unavailable, policy changes need a restart");
        }
    }

    let app = build_router(Arc::new(state));

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        error!(addr = %addr, error = %e, "Failed to bind to address");
        anyhow::anyhow!("Failed to bind to {}:{}: {}", host, port, e)
    })?;

    println!("✅ Registry is running on http://{}:{}", host, port);
    info!("Server listening on {}", addr);
    axum::serve(listener, app).await.map_err(|e| {
        error!(error = %e, "Server error");
        anyhow::anyhow!("Server error: {}", e)
    })?;

    Ok(())
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({"status": "healthy"}))
}
