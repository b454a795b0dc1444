//! Classic tabular estimators
//!
//! The artifact is a serialized [`TabularModel`]. JSON is the primary format;
//! YAML is tried second unless fallback is disabled.

use std::path::Path;

use ndarray::Array2;
use serde_json::Value;

use crate::config::{Framework, ModelConfig};
use crate::handler::payload::{self, Missing};
use crate::handler::{
    Adapter, InferenceFailure, InvalidInputFormat, LoadError, PredictionResponse,
};
use crate::loader;
use crate::model::{TabularModel, TabularOutput};

pub struct TabularAdapter {
    suffix: String,
    allow_format_fallback: bool,
}

impl TabularAdapter {
    pub fn new(suffix: impl Into<String>, allow_format_fallback: bool) -> Self {
        Self {
            suffix: suffix.into(),
            allow_format_fallback,
        }
    }

    pub fn from_config(config: &ModelConfig) -> Self {
        Self::new(config.model_format(), config.allow_format_fallback)
    }

    fn deserialize(&self, path: &Path, text: &str) -> Result<TabularModel, LoadError> {
        let json_err = match serde_json::from_str::<TabularModel>(text) {
            Ok(model) => return Ok(model),
            Err(e) => e,
        };
        if !self.allow_format_fallback {
            return Err(LoadError::failure(path, format!("JSON: {}", json_err)));
        }

        match serde_yaml::from_str::<TabularModel>(text) {
            Ok(model) => {
                tracing::warn!(
                    path = %path.display(),
                    json_error = %json_err,
                    "Primary JSON loader failed, loaded with YAML"
                );
                Ok(model)
            }
            Err(yaml_err) => Err(LoadError::failure(
                path,
                format!("JSON: {}; YAML: {}", json_err, yaml_err),
            )),
        }
    }
}

impl Adapter for TabularAdapter {
    type Artifact = TabularModel;
    type Input = Array2<f64>;
    type Output = TabularOutput;

    fn framework(&self) -> Framework {
        Framework::Tabular
    }

    fn load(&self, artifact_path: &Path) -> Result<TabularModel, LoadError> {
        let path = loader::find_artifact(artifact_path, &self.suffix)?;
        let text = loader::read_to_string(&path)?;
        let model = self.deserialize(&path, &text)?;
        model
            .validate()
            .map_err(|reason| LoadError::failure(&path, reason))?;

        tracing::info!(
            path = %path.display(),
            n_features = ?model.n_features(),
            "Loaded tabular estimator"
        );
        Ok(model)
    }

    fn preprocess(&self, raw: &Value) -> Result<Array2<f64>, InvalidInputFormat> {
        let payload = payload::unwrap_payload(raw, payload::NUMERIC_ENVELOPE)?;
        payload::to_matrix(&payload, Missing::Reject)
    }

    fn infer(
        &self,
        model: &TabularModel,
        input: Array2<f64>,
    ) -> Result<TabularOutput, InferenceFailure> {
        model.predict(&input).map_err(InferenceFailure::new)
    }

    fn postprocess(&self, output: TabularOutput) -> Result<PredictionResponse, InferenceFailure> {
        match output {
            TabularOutput::Values(values) => PredictionResponse::from_numbers(values),
            TabularOutput::Labels(labels) => Ok(PredictionResponse::new(Value::Array(
                labels.iter().map(|label| label.to_json()).collect(),
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServrConfig;
    use crate::handler::{Handler, PredictError};
    use serde_json::json;
    use std::fs;

    const LOGISTIC: &str = r#"{"estimator": "logistic_regression",
        "coef": [[0.5, -1.0, 0.25]], "intercept": [0.1], "classes": [0, 1]}"#;

    fn handler_for(dir: &Path, suffix: &str, fallback: bool) -> Handler<TabularAdapter> {
        Handler::new(TabularAdapter::new(suffix, fallback), dir)
    }

    #[test]
    fn test_logistic_model_scenario() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("model.joblib"), LOGISTIC).unwrap();

        let mut config = ServrConfig::default();
        config.model.model_dir = dir.path().to_path_buf();
        let mut handler = crate::adapters::build_handler(&config).unwrap();
        assert_eq!(handler.framework(), Framework::Tabular);
        handler.load().unwrap();
        assert!(handler.is_loaded());

        // 0.5 - 2.0 + 0.75 + 0.1 < 0
        let response = handler.predict(&json!({ "instances": [[1, 2, 3]] })).unwrap();
        assert_eq!(response.predictions, json!([0]));

        let response = handler
            .predict(&json!({ "instances": [[1, 2, 3], [4, 0, 0]] }))
            .unwrap();
        assert_eq!(response.predictions, json!([0, 1]));
    }

    #[test]
    fn test_string_payload_matches_envelope() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("model.joblib"), LOGISTIC).unwrap();
        let mut handler = handler_for(dir.path(), ".joblib", true);
        handler.load().unwrap();

        let envelope = handler.predict(&json!({ "data": [[4, 0, 0]] })).unwrap();
        let encoded = handler
            .predict(&json!(r#"{"instances": [[4, 0, 0]]}"#))
            .unwrap();
        let bare = handler.predict(&json!("[[4, 0, 0]]")).unwrap();
        assert_eq!(envelope, encoded);
        assert_eq!(envelope, bare);
    }

    #[test]
    fn test_configured_suffix() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("model.joblib"), "not a model").unwrap();
        fs::write(
            dir.path().join("regressor.json"),
            r#"{"estimator": "linear_regression", "coef": [2.0], "intercept": 1.0}"#,
        )
        .unwrap();

        let mut handler = handler_for(dir.path(), ".json", true);
        handler.load().unwrap();
        let response = handler.predict(&json!([[1.5], [-0.5]])).unwrap();
        assert_eq!(response.predictions, json!([4.0, 0.0]));
    }

    #[test]
    fn test_no_artifact_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut handler = handler_for(dir.path(), ".joblib", true);

        let err = handler.load().unwrap_err();
        assert!(matches!(err, LoadError::ArtifactNotFound { .. }));
        assert!(!handler.is_loaded());
    }

    #[test]
    fn test_yaml_fallback() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("model.joblib"),
            "estimator: linear_regression\ncoef: [1.0, 1.0]\nintercept: 0.0\n",
        )
        .unwrap();

        let mut handler = handler_for(dir.path(), ".joblib", true);
        handler.load().unwrap();
        let response = handler.predict(&json!([[1, 2]])).unwrap();
        assert_eq!(response.predictions, json!([3.0]));

        let mut strict = handler_for(dir.path(), ".joblib", false);
        let err = strict.load().unwrap_err();
        assert!(matches!(err, LoadError::LoadFailure { .. }));
        assert!(!strict.is_loaded());
    }

    #[test]
    fn test_both_loaders_fail() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("model.joblib"), "[1, 2").unwrap();

        let mut handler = handler_for(dir.path(), ".joblib", true);
        match handler.load().unwrap_err() {
            LoadError::LoadFailure { reason, .. } => {
                assert!(reason.contains("JSON:"));
                assert!(reason.contains("YAML:"));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_invalid_estimator_is_load_failure() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("model.joblib"),
            r#"{"estimator": "linear_regression", "coef": []}"#,
        )
        .unwrap();
        let mut handler = handler_for(dir.path(), ".joblib", true);
        assert!(matches!(
            handler.load().unwrap_err(),
            LoadError::LoadFailure { .. }
        ));
    }

    #[test]
    fn test_tree_without_classes_fails_at_load() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("model.joblib"),
            r#"{"estimator": "decision_tree", "children_left": [-1], "children_right": [-1],
                "feature": [-2], "threshold": [0.0], "value": [[]], "classes": []}"#,
        )
        .unwrap();

        let mut handler = handler_for(dir.path(), ".joblib", true);
        assert!(matches!(
            handler.load().unwrap_err(),
            LoadError::LoadFailure { .. }
        ));
        assert!(!handler.is_loaded());
        assert!(matches!(
            handler.predict(&json!([[1.0]])).unwrap_err(),
            PredictError::NotLoaded
        ));
    }

    #[test]
    fn test_request_errors() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("model.joblib"), LOGISTIC).unwrap();
        let mut handler = handler_for(dir.path(), ".joblib", true);
        handler.load().unwrap();

        for raw in [
            json!({ "instances": "not json" }),
            json!([1, 2, 3]),
            json!([[1, 2], [3]]),
            json!({ "instances": [["a", "b", "c"]] }),
        ] {
            let err = handler.predict(&raw).unwrap_err();
            assert!(matches!(err, PredictError::InvalidInput(_)), "{}", raw);
        }

        let err = handler.predict(&json!([[1, 2]])).unwrap_err();
        assert!(matches!(err, PredictError::Inference(_)));
    }

    #[test]
    fn test_response_serializes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("model.joblib"), LOGISTIC).unwrap();
        let mut handler = handler_for(dir.path(), ".joblib", true);
        handler.load().unwrap();

        let response = handler.predict(&json!([[4, 0, 0]])).unwrap();
        let text = serde_json::to_string(&response).unwrap();
        let back: PredictionResponse = serde_json::from_str(&text).unwrap();
        assert_eq!(back, response);
    }
}
