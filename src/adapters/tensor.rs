//! Dense tensor networks
//!
//! A packaged `.safetensors` file is preferred; without one, a saved-model
//! directory is loaded and its `serving_default` signature bound.

use std::path::Path;

use ndarray::ArrayD;
use serde_json::Value;

use crate::config::{Framework, ModelConfig};
use crate::handler::payload;
use crate::handler::{
    Adapter, InferenceFailure, InvalidInputFormat, LoadError, PredictionResponse,
};
use crate::loader;
use crate::model::{DeepModel, SavedModel, Sequential, SERVING_DEFAULT};

pub struct DeepTensorAdapter {
    suffix: String,
}

impl DeepTensorAdapter {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
        }
    }

    pub fn from_config(config: &ModelConfig) -> Self {
        Self::new(config.model_format())
    }

    fn load_saved_model(dir: &Path, manifest: &Path) -> Result<DeepModel, LoadError> {
        tracing::info!(
            path = %dir.display(),
            signature = SERVING_DEFAULT,
            "Loading saved model"
        );
        let signature = SavedModel::load(dir)
            .and_then(|saved| saved.into_signature(SERVING_DEFAULT))
            .map_err(|e| LoadError::failure(manifest, format!("{:#}", e)))?;

        tracing::info!(
            input = signature.input_name(),
            outputs = ?signature.output_names().collect::<Vec<_>>(),
            "Bound serving signature"
        );
        Ok(DeepModel::Signature(signature))
    }
}

impl Adapter for DeepTensorAdapter {
    type Artifact = DeepModel;
    type Input = ArrayD<f32>;
    type Output = ArrayD<f32>;

    fn framework(&self) -> Framework {
        Framework::DeepTensor
    }

    fn load(&self, artifact_path: &Path) -> Result<DeepModel, LoadError> {
        match loader::find_artifact(artifact_path, &self.suffix) {
            Ok(path) => {
                tracing::info!(path = %path.display(), "Loading packaged network");
                let model = Sequential::load(&path)
                    .map_err(|e| LoadError::failure(&path, format!("{:#}", e)))?;
                tracing::info!(
                    layers = model.layers().len(),
                    input_dim = model.input_dim(),
                    "Loaded packaged network"
                );
                Ok(DeepModel::Packaged(model))
            }
            Err(LoadError::ArtifactNotFound { .. }) => {
                match loader::find_saved_model(artifact_path) {
                    Some(manifest) => Self::load_saved_model(artifact_path, &manifest),
                    None => Err(LoadError::not_found(
                        artifact_path,
                        format!("*{} or {}", self.suffix, loader::SAVED_MODEL_MANIFEST),
                    )),
                }
            }
            Err(e) => Err(e),
        }
    }

    fn preprocess(&self, raw: &Value) -> Result<ArrayD<f32>, InvalidInputFormat> {
        let payload = payload::unwrap_payload(raw, payload::NUMERIC_ENVELOPE)?;
        payload::to_tensor(&payload)
    }

    fn infer(&self, model: &DeepModel, input: ArrayD<f32>) -> Result<ArrayD<f32>, InferenceFailure> {
        model.predict(&input).map_err(InferenceFailure::new)
    }

    fn postprocess(&self, output: ArrayD<f32>) -> Result<PredictionResponse, InferenceFailure> {
        PredictionResponse::from_tensor(output.view())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{Handler, PredictError};
    use crate::model::network::tests::{packaged_bytes, write_saved_model};
    use serde_json::json;
    use std::fs;

    fn handler(dir: &Path) -> Handler<DeepTensorAdapter> {
        Handler::new(DeepTensorAdapter::new(".safetensors"), dir)
    }

    #[test]
    fn test_packaged_network() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("model.safetensors"), packaged_bytes()).unwrap();

        let mut handler = handler(dir.path());
        handler.load().unwrap();

        let response = handler
            .predict(&json!({ "instances": [[0.0, 0.0], [2.0, 0.0]] }))
            .unwrap();
        let rows = response.predictions.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], json!([0.5, 0.5]));
        assert_eq!(rows[1].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_packaged_file_wins_over_saved_model() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("model.safetensors"), packaged_bytes()).unwrap();
        fs::write(dir.path().join(loader::SAVED_MODEL_MANIFEST), "{ broken").unwrap();

        let mut handler = handler(dir.path());
        handler.load().unwrap();
        assert!(handler.is_loaded());
    }

    #[test]
    fn test_saved_model_signature() {
        let dir = tempfile::tempdir().unwrap();
        write_saved_model(dir.path());

        let mut handler = handler(dir.path());
        handler.load().unwrap();

        let response = handler.predict(&json!([[0.0, 0.0]])).unwrap();
        assert_eq!(response.predictions, json!([[0.5, 0.5]]));
    }

    #[test]
    fn test_broken_manifest_is_load_failure() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(loader::SAVED_MODEL_MANIFEST), "{ broken").unwrap();

        let mut handler = handler(dir.path());
        assert!(matches!(
            handler.load().unwrap_err(),
            LoadError::LoadFailure { .. }
        ));
    }

    #[test]
    fn test_empty_directory_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut handler = handler(dir.path());
        assert!(matches!(
            handler.load().unwrap_err(),
            LoadError::ArtifactNotFound { .. }
        ));
        assert!(!handler.is_loaded());
    }

    #[test]
    fn test_input_errors() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("model.safetensors"), packaged_bytes()).unwrap();
        let mut handler = handler(dir.path());
        handler.load().unwrap();

        let err = handler.predict(&json!({ "instances": 3.5 })).unwrap_err();
        assert!(matches!(err, PredictError::InvalidInput(_)));

        let err = handler.predict(&json!([[1.0, 2.0, 3.0]])).unwrap_err();
        assert!(matches!(err, PredictError::Inference(_)));
    }
}
