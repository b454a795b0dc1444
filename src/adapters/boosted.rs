//! Gradient-boosted tree ensembles in XGBoost JSON format

use std::path::Path;

use serde_json::Value;

use crate::config::{Framework, ModelConfig};
use crate::handler::payload::{self, Missing};
use crate::handler::{
    Adapter, InferenceFailure, InvalidInputFormat, LoadError, PredictionResponse,
};
use crate::loader;
use crate::model::{BoostedPrediction, Booster, DMatrix};

pub struct BoostedTreeAdapter {
    suffix: String,
}

impl BoostedTreeAdapter {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
        }
    }

    pub fn from_config(config: &ModelConfig) -> Self {
        Self::new(config.model_format())
    }
}

impl Adapter for BoostedTreeAdapter {
    type Artifact = Booster;
    type Input = DMatrix;
    type Output = BoostedPrediction;

    fn framework(&self) -> Framework {
        Framework::BoostedTree
    }

    fn load(&self, artifact_path: &Path) -> Result<Booster, LoadError> {
        let path = loader::find_artifact(artifact_path, &self.suffix)?;
        let text = loader::read_to_string(&path)?;
        let booster = Booster::from_json(&text).map_err(|reason| LoadError::failure(&path, reason))?;

        tracing::info!(
            path = %path.display(),
            objective = booster.objective(),
            trees = booster.num_trees(),
            groups = booster.num_groups(),
            features = ?booster.num_features(),
            "Loaded booster"
        );
        Ok(booster)
    }

    /// `null` cells become missing values
    fn preprocess(&self, raw: &Value) -> Result<DMatrix, InvalidInputFormat> {
        let payload = payload::unwrap_payload(raw, payload::NUMERIC_ENVELOPE)?;
        let matrix = payload::to_matrix(&payload, Missing::AsNan)?;
        Ok(DMatrix::from_f64(&matrix))
    }

    fn infer(&self, booster: &Booster, input: DMatrix) -> Result<BoostedPrediction, InferenceFailure> {
        booster.predict(&input).map_err(InferenceFailure::new)
    }

    fn postprocess(
        &self,
        output: BoostedPrediction,
    ) -> Result<PredictionResponse, InferenceFailure> {
        match output {
            BoostedPrediction::Vector(values) => PredictionResponse::from_numbers(values),
            BoostedPrediction::Matrix(values) => {
                PredictionResponse::from_tensor(values.view().into_dyn())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{Handler, PredictError};
    use crate::model::booster::tests::binary_model_json;
    use serde_json::json;
    use std::fs;

    fn loaded(dir: &Path) -> Handler<BoostedTreeAdapter> {
        let mut handler = Handler::new(BoostedTreeAdapter::new(".json"), dir);
        handler.load().unwrap();
        handler
    }

    #[test]
    fn test_predict_probabilities() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("model.json"), binary_model_json()).unwrap();
        let handler = loaded(dir.path());

        let response = handler
            .predict(&json!({ "instances": [[1, 2, 3], [2, 3, 0]] }))
            .unwrap();
        let preds = response.predictions.as_array().unwrap();
        assert_eq!(preds.len(), 2);
        let first = preds[0].as_f64().unwrap();
        assert!(first > 0.0 && first < 0.5);
        assert!(preds[1].as_f64().unwrap() > 0.5);
    }

    #[test]
    fn test_null_is_missing_value() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("model.json"), binary_model_json()).unwrap();
        let handler = loaded(dir.path());

        let response = handler.predict(&json!([[null, null, 0]])).unwrap();
        assert_eq!(response.predictions.as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_softprob_is_two_dimensional() {
        let mut model: Value = serde_json::from_str(&binary_model_json()).unwrap();
        model["learner"]["learner_model_param"]["num_class"] = json!("2");
        model["learner"]["gradient_booster"]["model"]["tree_info"] = json!([0, 1]);
        model["learner"]["objective"]["name"] = json!("multi:softprob");

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("model.json"), model.to_string()).unwrap();
        let handler = loaded(dir.path());

        let response = handler.predict(&json!({ "data": [[1, 2, 0]] })).unwrap();
        let rows = response.predictions.as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_feature_mismatch_is_inference_failure() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("model.json"), binary_model_json()).unwrap();
        let handler = loaded(dir.path());

        let err = handler.predict(&json!([[1, 2]])).unwrap_err();
        assert!(matches!(err, PredictError::Inference(_)));
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut handler = Handler::new(BoostedTreeAdapter::new(".json"), dir.path());
        assert!(matches!(
            handler.load().unwrap_err(),
            LoadError::ArtifactNotFound { .. }
        ));

        fs::write(dir.path().join("model.json"), r#"{"learner": {}}"#).unwrap();
        assert!(matches!(
            handler.load().unwrap_err(),
            LoadError::LoadFailure { .. }
        ));
        assert!(!handler.is_loaded());
    }
}
