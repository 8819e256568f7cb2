use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::middleware::{rate_limit, require_auth};
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let mut protected = Router::new()
        // Auth
        .route("/api/auth/status", get(handlers::auth_status))
        // Storage setup
        .route("/api/setup/status", get(handlers::setup_status))
        .route("/api/setup/config", post(handlers::save_config))
        .route("/api/setup/test", post(handlers::test_config))
        // Uploads
        .route("/api/upload/presign", post(handlers::presign_upload))
        .route("/api/upload/confirm", post(handlers::confirm_upload))
        .route(
            "/api/upload/multipart/init",
            post(handlers::initiate_multipart),
        )
        .route("/api/upload/multipart/presign", post(handlers::presign_part))
        .route(
            "/api/upload/multipart/complete",
            post(handlers::complete_multipart),
        )
        .route("/api/upload/cancel", post(handlers::cancel_upload))
        // Files
        .route("/api/files", get(handlers::list_files))
        .route("/api/files/:id", delete(handlers::delete_file))
        .route("/api/stats", get(handlers::storage_stats));

    // Test-only routes
    if state.config.test_mode {
        tracing::warn!("Test mode enabled, purge route is available.");
        protected = protected.route("/admin/purge", delete(handlers::admin_purge));
    }

    let protected = protected.route_layer(middleware::from_fn_with_state(
        Arc::clone(&state),
        require_auth,
    ));

    let public = Router::new()
        .route("/api/auth/login", post(handlers::login))
        .route("/api/auth/setup-password", post(handlers::setup_password))
        .route("/api/auth/password-status", get(handlers::password_status))
        .route("/api/files/:id/download", get(handlers::download_file))
        .route("/s/:code", get(handlers::short_link))
        .route("/_internal/health", get(handlers::health));

    protected
        .merge(public)
        .layer(middleware::from_fn_with_state(Arc::clone(&state), rate_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
