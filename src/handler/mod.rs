//! Model handler lifecycle
//!
//! A [`Handler`] owns exactly one model artifact. It starts unloaded, becomes
//! loaded at most once through [`Handler::load`], and serves
//! [`Handler::predict`] by sequencing the adapter's
//! `preprocess → infer → postprocess` stages.
//!
//! Framework specifics live behind the [`Adapter`] trait; see
//! [`crate::adapters`] for the concrete implementations.

pub mod error;
pub mod payload;
pub mod response;

pub use error::{InferenceFailure, InvalidInputFormat, LoadError, PredictError};
pub use response::PredictionResponse;

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::config::Framework;

/// Framework-specific half of a handler.
///
/// Each stage has its own error type so the caller can tell a malformed
/// request from a broken model.
pub trait Adapter: Send + Sync {
    /// In-memory model produced by [`Adapter::load`]
    type Artifact: Send + Sync;
    /// Structured input produced by [`Adapter::preprocess`]
    type Input;
    /// Framework-native output produced by [`Adapter::infer`]
    type Output;

    /// Framework this adapter serves
    fn framework(&self) -> Framework;

    /// Discover and construct the artifact under `artifact_path`.
    fn load(&self, artifact_path: &Path) -> Result<Self::Artifact, LoadError>;

    /// Coerce a raw request into the adapter's input structure.
    fn preprocess(&self, raw: &Value) -> Result<Self::Input, InvalidInputFormat>;

    /// Run the model.
    fn infer(
        &self,
        artifact: &Self::Artifact,
        input: Self::Input,
    ) -> Result<Self::Output, InferenceFailure>;

    /// Convert framework output into a JSON-serializable response.
    fn postprocess(&self, output: Self::Output) -> Result<PredictionResponse, InferenceFailure>;
}

/// Object-safe view of a handler, used by the serving layer once the
/// framework has been chosen from configuration.
pub trait ModelService: Send + Sync {
    fn framework(&self) -> Framework;
    fn artifact_path(&self) -> &Path;
    fn load(&mut self) -> Result<(), LoadError>;
    fn is_loaded(&self) -> bool;
    fn predict(&self, raw: &Value) -> Result<PredictionResponse, PredictError>;
}

/// Lifecycle controller for one model instance.
pub struct Handler<A: Adapter> {
    adapter: A,
    artifact_path: PathBuf,
    artifact: Option<A::Artifact>,
}

impl<A: Adapter> Handler<A> {
    /// Create an unloaded handler.
    pub fn new(adapter: A, artifact_path: impl Into<PathBuf>) -> Self {
        Self {
            adapter,
            artifact_path: artifact_path.into(),
            artifact: None,
        }
    }

    /// Get the adapter
    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Get the configured artifact location
    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }

    /// Load the artifact. A handler that is already loaded is left untouched.
    pub fn load(&mut self) -> Result<(), LoadError> {
        let framework = self.adapter.framework();
        if self.artifact.is_some() {
            tracing::debug!(%framework, "model already loaded, ignoring load request");
            return Ok(());
        }

        tracing::info!(
            %framework,
            path = %self.artifact_path.display(),
            "Loading model"
        );
        let start = std::time::Instant::now();

        match self.adapter.load(&self.artifact_path) {
            Ok(artifact) => {
                self.artifact = Some(artifact);
                tracing::info!(
                    %framework,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Model loaded successfully"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(%framework, stage = "load", error = %e, "Error loading model");
                Err(e)
            }
        }
    }

    /// True iff a model artifact is held.
    pub fn is_loaded(&self) -> bool {
        self.artifact.is_some()
    }

    /// Run one prediction.
    pub fn predict(&self, raw: &Value) -> Result<PredictionResponse, PredictError> {
        let artifact = self.artifact.as_ref().ok_or_else(|| {
            tracing::error!(stage = "predict", "predict called before the model was loaded");
            PredictError::NotLoaded
        })?;

        let input = self.adapter.preprocess(raw).map_err(|e| {
            tracing::error!(stage = "preprocess", error = %e, "Error in preprocessing");
            e
        })?;

        let output = self.adapter.infer(artifact, input).map_err(|e| {
            tracing::error!(stage = "infer", error = %e, "Error during inference");
            e
        })?;

        let response = self.adapter.postprocess(output).map_err(|e| {
            tracing::error!(stage = "postprocess", error = %e, "Error in postprocessing");
            e
        })?;

        Ok(response)
    }
}

impl<A: Adapter> ModelService for Handler<A> {
    fn framework(&self) -> Framework {
        self.adapter.framework()
    }

    fn artifact_path(&self) -> &Path {
        Handler::artifact_path(self)
    }

    fn load(&mut self) -> Result<(), LoadError> {
        Handler::load(self)
    }

    fn is_loaded(&self) -> bool {
        Handler::is_loaded(self)
    }

    fn predict(&self, raw: &Value) -> Result<PredictionResponse, PredictError> {
        Handler::predict(self, raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Doubles every number of a flat list; fails to load when told to.
    struct Doubler {
        fail_load: bool,
        loads: AtomicUsize,
    }

    impl Doubler {
        fn new(fail_load: bool) -> Self {
            Self {
                fail_load,
                loads: AtomicUsize::new(0),
            }
        }
    }

    impl Adapter for Doubler {
        type Artifact = f64;
        type Input = Vec<f64>;
        type Output = Vec<f64>;

        fn framework(&self) -> Framework {
            Framework::Tabular
        }

        fn load(&self, artifact_path: &Path) -> Result<f64, LoadError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.fail_load {
                Err(LoadError::failure(artifact_path, "corrupt"))
            } else {
                Ok(2.0)
            }
        }

        fn preprocess(&self, raw: &Value) -> Result<Vec<f64>, InvalidInputFormat> {
            let payload = payload::unwrap_payload(raw, payload::NUMERIC_ENVELOPE)?;
            payload
                .as_array()
                .ok_or_else(|| InvalidInputFormat::new("expected a list"))?
                .iter()
                .map(|v| {
                    v.as_f64()
                        .ok_or_else(|| InvalidInputFormat::new("expected a number"))
                })
                .collect()
        }

        fn infer(&self, factor: &f64, input: Vec<f64>) -> Result<Vec<f64>, InferenceFailure> {
            if input.iter().any(|v| *v < 0.0) {
                return Err(InferenceFailure::new("negative input"));
            }
            Ok(input.into_iter().map(|v| v * factor).collect())
        }

        fn postprocess(&self, output: Vec<f64>) -> Result<PredictionResponse, InferenceFailure> {
            PredictionResponse::from_numbers(output)
        }
    }

    #[test]
    fn test_predict_before_load_is_not_loaded() {
        let handler = Handler::new(Doubler::new(false), "/models");
        let err = handler.predict(&json!([1.0])).unwrap_err();
        assert!(matches!(err, PredictError::NotLoaded));
    }

    #[test]
    fn test_is_loaded_transitions() {
        let mut handler = Handler::new(Doubler::new(false), "/models");
        assert!(!handler.is_loaded());
        handler.load().unwrap();
        assert!(handler.is_loaded());
        assert!(handler.is_loaded());
    }

    #[test]
    fn test_failed_load_stays_unloaded() {
        let mut handler = Handler::new(Doubler::new(true), "/models");
        let err = handler.load().unwrap_err();
        assert!(matches!(err, LoadError::LoadFailure { .. }));
        assert!(!handler.is_loaded());
        assert!(matches!(
            handler.predict(&json!([1.0])),
            Err(PredictError::NotLoaded)
        ));
    }

    #[test]
    fn test_second_load_is_a_no_op() {
        let mut handler = Handler::new(Doubler::new(false), "/models");
        handler.load().unwrap();
        handler.load().unwrap();
        assert_eq!(handler.adapter().loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stage_errors_keep_their_kind() {
        let mut handler = Handler::new(Doubler::new(false), "/models");
        handler.load().unwrap();

        let response = handler.predict(&json!({ "instances": [1.0, 2.5] })).unwrap();
        assert_eq!(response.predictions, json!([2.0, 5.0]));

        let err = handler.predict(&json!(true)).unwrap_err();
        assert!(matches!(err, PredictError::InvalidInput(_)));

        let err = handler.predict(&json!([-1.0])).unwrap_err();
        assert!(matches!(err, PredictError::Inference(_)));
    }

    #[test]
    fn test_service_trait_object() {
        let mut service: Box<dyn ModelService> = Box::new(Handler::new(Doubler::new(false), "/m"));
        assert!(!service.is_loaded());
        service.load().unwrap();
        assert!(service.is_loaded());
        assert_eq!(service.framework(), Framework::Tabular);
        assert_eq!(service.artifact_path(), Path::new("/m"));
    }
}
