//! Transport-neutral prediction response

use ndarray::{ArrayViewD, Axis};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use super::error::InferenceFailure;

/// Response body of a prediction: `{"predictions": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub predictions: Value,
}

impl PredictionResponse {
    pub fn new(predictions: Value) -> Self {
        Self { predictions }
    }

    /// One number per row.
    pub fn from_numbers<I>(values: I) -> Result<Self, InferenceFailure>
    where
        I: IntoIterator,
        I::Item: Into<f64>,
    {
        let predictions = values
            .into_iter()
            .map(|v| number(v.into()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(Value::Array(predictions)))
    }

    /// Materialize a tensor into nested lists with the same shape.
    pub fn from_tensor(tensor: ArrayViewD<'_, f32>) -> Result<Self, InferenceFailure> {
        Ok(Self::new(tensor_to_json(tensor)?))
    }

    /// One string per input prompt.
    pub fn from_strings(values: Vec<String>) -> Self {
        Self::new(Value::Array(values.into_iter().map(Value::String).collect()))
    }
}

/// Convert a float to a JSON number, rejecting NaN and infinities.
pub fn number(value: f64) -> Result<Value, InferenceFailure> {
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| InferenceFailure::new(format!("model produced non-finite output {}", value)))
}

fn tensor_to_json(tensor: ArrayViewD<'_, f32>) -> Result<Value, InferenceFailure> {
    if tensor.ndim() == 0 {
        let value = tensor
            .iter()
            .next()
            .copied()
            .ok_or_else(|| InferenceFailure::new("empty scalar tensor"))?;
        return number(value as f64);
    }

    tensor
        .axis_iter(Axis(0))
        .map(tensor_to_json)
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, ArrayD, IxDyn};
    use serde_json::json;

    #[test]
    fn test_tensor_materialization_keeps_shape() {
        let tensor = arr2(&[[0.5f32, 1.0], [2.0, 4.0]]).into_dyn();
        let response = PredictionResponse::from_tensor(tensor.view()).unwrap();
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({ "predictions": [[0.5, 1.0], [2.0, 4.0]] })
        );

        let cube = ArrayD::<f32>::zeros(IxDyn(&[2, 1, 3]));
        let response = PredictionResponse::from_tensor(cube.view()).unwrap();
        assert_eq!(response.predictions[1][0].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_non_finite_output_is_rejected() {
        assert!(PredictionResponse::from_numbers([1.0f64, f64::NAN]).is_err());
        assert!(PredictionResponse::from_numbers([f32::INFINITY]).is_err());
    }

    #[test]
    fn test_strings() {
        let response = PredictionResponse::from_strings(vec!["a".into(), "b".into()]);
        assert_eq!(response.predictions, json!(["a", "b"]));
    }
}
