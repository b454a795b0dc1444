//! Route definitions

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{invocations, ping, AppState};

/// Create the router with the container-inference endpoints
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Readiness
        .route("/ping", get(ping))
        // Predictions
        .route("/invocations", post(invocations))
}
