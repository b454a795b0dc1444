//! HTTP server for inference
//!
//! Exposes `GET /ping` and `POST /invocations` over one loaded model.

mod handlers;
mod routes;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::DefaultBodyLimit;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::handler::ModelService;

pub use handlers::{AppState, ErrorDetail, ErrorResponse};
pub use routes::api_routes;

/// Build the application router with its middleware stack
pub fn router(service: Arc<dyn ModelService>, config: &ServerConfig) -> Router {
    let state = Arc::new(AppState::new(service, config.max_concurrent_requests));

    let mut app = Router::new()
        .merge(api_routes())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.max_body_size))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.request_timeout_secs,
        )));

    if config.cors_enabled {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }
    if config.request_logging {
        app = app.layer(TraceLayer::new_for_http());
    }

    app.with_state(state)
}

/// Start the HTTP inference server
pub async fn start(service: Arc<dyn ModelService>, config: ServerConfig) -> Result<()> {
    let framework = service.framework();
    let app = router(service, &config);

    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!(%framework, "Server listening on http://{}", addr);
    tracing::info!("API endpoints:");
    tracing::info!("  GET  /ping - Readiness check");
    tracing::info!("  POST /invocations - Prediction");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
