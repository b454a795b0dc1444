//! HTTP request handlers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tokio::sync::Semaphore;

use crate::handler::{payload, ModelService, PredictError};

/// Shared application state
pub struct AppState {
    pub service: Arc<dyn ModelService>,
    limiter: Arc<Semaphore>,
}

impl AppState {
    /// `max_concurrent` bounds the predictions running at once
    pub fn new(service: Arc<dyn ModelService>, max_concurrent: usize) -> Self {
        Self {
            service,
            limiter: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }
}

/// Readiness check: 200 once the model is loaded
pub async fn ping(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.service.is_loaded() {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "model not loaded")
    }
}

/// Prediction endpoint
pub async fn invocations(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let raw = payload::decode_body(&body);

    let permit = match Arc::clone(&state.limiter).acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            return error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "server is shutting down".to_string(),
                "server_error",
            )
        }
    };

    let service = Arc::clone(&state.service);
    let result = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        service.predict(&raw)
    })
    .await;

    match result {
        Ok(Ok(response)) => (StatusCode::OK, Json(response)).into_response(),
        Ok(Err(e)) => {
            if e.is_client_error() {
                tracing::debug!(error = %e, "Rejected invocation payload");
            } else {
                tracing::warn!(error = %e, kind = e.kind(), "Invocation failed");
            }
            error_response(status_for(&e), e.to_string(), e.kind())
        }
        Err(e) => {
            tracing::error!(error = %e, "Prediction task failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "prediction task failed".to_string(),
                "server_error",
            )
        }
    }
}

fn status_for(error: &PredictError) -> StatusCode {
    match error {
        PredictError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        PredictError::NotLoaded => StatusCode::SERVICE_UNAVAILABLE,
        PredictError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(status: StatusCode, message: String, kind: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: ErrorDetail {
                message,
                r#type: kind.to_string(),
            },
        }),
    )
        .into_response()
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub message: String,
    pub r#type: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Framework;
    use crate::handler::{InferenceFailure, InvalidInputFormat, LoadError, PredictionResponse};
    use serde_json::{json, Value};
    use std::path::Path;

    /// Echoes `{"instances": X}` back; `"fail"` is an inference error.
    struct EchoService {
        loaded: bool,
    }

    impl ModelService for EchoService {
        fn framework(&self) -> Framework {
            Framework::Tabular
        }

        fn artifact_path(&self) -> &Path {
            Path::new("/opt/ml/model")
        }

        fn load(&mut self) -> Result<(), LoadError> {
            self.loaded = true;
            Ok(())
        }

        fn is_loaded(&self) -> bool {
            self.loaded
        }

        fn predict(&self, raw: &Value) -> Result<PredictionResponse, PredictError> {
            if !self.loaded {
                return Err(PredictError::NotLoaded);
            }
            match raw.get("instances") {
                Some(Value::String(s)) if s == "fail" => {
                    Err(InferenceFailure::new("model exploded").into())
                }
                Some(value) => Ok(PredictionResponse::new(value.clone())),
                None => Err(InvalidInputFormat::new("missing instances").into()),
            }
        }
    }

    fn state(loaded: bool) -> State<Arc<AppState>> {
        State(Arc::new(AppState::new(Arc::new(EchoService { loaded }), 2)))
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_ping() {
        let response = ping(state(true)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let response = ping(state(false)).await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_invocations_success() {
        let response = invocations(state(true), Bytes::from(r#"{"instances": [[1, 2]]}"#)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "predictions": [[1, 2]] }));
    }

    #[tokio::test]
    async fn test_invocations_status_mapping() {
        let response = invocations(state(true), Bytes::from(r#"{"rows": []}"#)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["type"], "invalid_input");

        let response = invocations(state(true), Bytes::from(r#"{"instances": "fail"}"#)).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["error"]["type"], "inference_error");

        let response = invocations(state(false), Bytes::from("{}")).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(response).await["error"]["type"], "model_not_loaded");
    }

    #[tokio::test]
    async fn test_non_json_body_reaches_the_model_as_a_string() {
        let response = invocations(state(true), Bytes::from("plain text")).await;
        // a bare string has no "instances" key
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
