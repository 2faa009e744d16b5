pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use std::path::Path;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Submission
        .route("/api/functions", get(routes::invoke::list_functions))
        .route(
            "/api/invoke/{function}",
            post(routes::invoke::invoke_function),
        )
        // Reads
        .route("/api/items", get(routes::items::list_items))
        .route(
            "/api/items/{item_type}/{item_number}",
            get(routes::items::get_item),
        )
        .route(
            "/api/items/{item_type}/{item_number}/history",
            get(routes::items::item_history),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Open the project at `root` and serve its ledger on `0.0.0.0:port`.
pub async fn serve(root: &Path, port: u16) -> anyhow::Result<()> {
    let state = AppState::open(root)?;
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    serve_on(state, listener).await
}

/// Serve on a pre-bound listener, so the caller can read the actual port
/// first (useful when `port = 0`).
pub async fn serve_on(state: AppState, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    tracing::info!(
        project = %state.config.project.name,
        root = %state.root.display(),
        "pipeline server listening on http://localhost:{actual_port}"
    );
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}
