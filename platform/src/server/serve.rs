//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::PlatformError;
use crate::server::handlers::{
    cancel_deployment_handler, check_project_handler, create_project_handler, deploy_handler,
    get_deployment_handler, get_project_handler, health_handler, list_deployments_handler,
    logs_handler, publish_events_handler, resolve_handler, version_handler,
};
use crate::server::state::ServerState;

/// Control API routes
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Projects
        .route("/project", post(create_project_handler))
        .route("/project/check", get(check_project_handler))
        .route("/project/{id}", get(get_project_handler))
        .route("/project/{id}/deployments", get(list_deployments_handler))
        // Deployments
        .route("/deploy", post(deploy_handler))
        .route("/deployment/{id}", get(get_deployment_handler))
        .route("/deployment/{id}/cancel", post(cancel_deployment_handler))
        .route("/resolve/{slug}", get(resolve_handler))
        // Logs
        .route("/logs/{id}", get(logs_handler))
        .route("/events", post(publish_events_handler))
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), PlatformError>>, PlatformError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting control API on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| PlatformError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| PlatformError::ServerError(e.to_string()))
    });

    Ok(handle)
}
