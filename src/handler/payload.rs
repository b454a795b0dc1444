//! Request payload unwrapping and array coercion shared by all adapters
//!
//! A request body is either an envelope (`{"instances": X}`, `{"data": X}`,
//! `{"inputs": X}`), the bare value `X`, or a JSON-encoded string of either.
//! Everything here reports problems as [`InvalidInputFormat`].

use std::borrow::Cow;

use ndarray::{Array2, ArrayD, IxDyn};
use serde_json::Value;

use super::error::InvalidInputFormat;

/// Envelope keys recognized by the numeric adapters, in precedence order.
pub const NUMERIC_ENVELOPE: &[&str] = &["instances", "data"];

/// Envelope keys recognized by the text-generation adapter, in precedence order.
pub const TEXT_ENVELOPE: &[&str] = &["instances", "inputs"];

/// Return the value under the first present envelope key, or the value itself.
pub fn extract_envelope<'a>(value: &'a Value, keys: &[&str]) -> &'a Value {
    if let Value::Object(map) = value {
        for key in keys {
            if let Some(inner) = map.get(*key) {
                return inner;
            }
        }
    }
    value
}

/// Resolve a raw request into the payload a numeric adapter converts.
///
/// String bodies are parsed as JSON before and after envelope extraction, so
/// `"{\"instances\": X}"`, `{"instances": "X"}` and `X` all resolve alike.
pub fn unwrap_payload<'a>(
    raw: &'a Value,
    keys: &[&str],
) -> Result<Cow<'a, Value>, InvalidInputFormat> {
    let parsed = parse_if_string(Cow::Borrowed(raw))?;
    let extracted = match parsed {
        Cow::Borrowed(value) => Cow::Borrowed(extract_envelope(value, keys)),
        Cow::Owned(value) => Cow::Owned(extract_envelope(&value, keys).clone()),
    };
    parse_if_string(extracted)
}

fn parse_if_string(value: Cow<'_, Value>) -> Result<Cow<'_, Value>, InvalidInputFormat> {
    if let Value::String(text) = value.as_ref() {
        return Ok(Cow::Owned(serde_json::from_str(text)?));
    }
    Ok(value)
}

/// Decode a request body: JSON when it parses, otherwise the raw text as a
/// JSON string.
pub fn decode_body(body: &[u8]) -> Value {
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

/// How JSON `null` cells are treated during numeric conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    /// `null` is a format error
    Reject,
    /// `null` becomes NaN (a missing value for tree models)
    AsNan,
}

/// Convert a rectangular 2-D JSON array of numbers into a matrix.
pub fn to_matrix(value: &Value, missing: Missing) -> Result<Array2<f64>, InvalidInputFormat> {
    let shape = infer_shape(value);
    if shape.len() != 2 {
        return Err(InvalidInputFormat::new(format!(
            "expected a 2-D array of numbers, got {}",
            describe(value, &shape)
        )));
    }
    if shape[0] == 0 || shape[1] == 0 {
        return Err(InvalidInputFormat::new("input matrix is empty"));
    }

    let mut data = Vec::with_capacity(shape[0] * shape[1]);
    flatten_into(value, &shape, missing, &mut data)?;

    Array2::from_shape_vec((shape[0], shape[1]), data)
        .map_err(|e| InvalidInputFormat::new(e.to_string()))
}

/// Convert a rectangular JSON array of numbers of any rank >= 1 into an f32 tensor.
pub fn to_tensor(value: &Value) -> Result<ArrayD<f32>, InvalidInputFormat> {
    let shape = infer_shape(value);
    if shape.is_empty() {
        return Err(InvalidInputFormat::new(format!(
            "expected an array of numbers, got {}",
            describe(value, &shape)
        )));
    }
    if shape.contains(&0) {
        return Err(InvalidInputFormat::new("input tensor is empty"));
    }

    let mut data = Vec::with_capacity(shape.iter().product());
    flatten_into(value, &shape, Missing::Reject, &mut data)?;

    let data = data.into_iter().map(|v| v as f32).collect();
    ArrayD::from_shape_vec(IxDyn(&shape), data).map_err(|e| InvalidInputFormat::new(e.to_string()))
}

/// Shape implied by following the first element at every nesting level.
fn infer_shape(value: &Value) -> Vec<usize> {
    let mut shape = Vec::new();
    let mut current = value;
    while let Value::Array(items) = current {
        shape.push(items.len());
        match items.first() {
            Some(first) => current = first,
            None => break,
        }
    }
    shape
}

fn flatten_into(
    value: &Value,
    shape: &[usize],
    missing: Missing,
    out: &mut Vec<f64>,
) -> Result<(), InvalidInputFormat> {
    match shape.split_first() {
        None => {
            let number = match value {
                Value::Number(n) => n
                    .as_f64()
                    .ok_or_else(|| InvalidInputFormat::new(format!("unrepresentable number {}", n)))?,
                Value::Null if missing == Missing::AsNan => f64::NAN,
                other => {
                    return Err(InvalidInputFormat::new(format!(
                        "expected a number, got {}",
                        type_name(other)
                    )))
                }
            };
            out.push(number);
            Ok(())
        }
        Some((&len, rest)) => {
            let items = value.as_array().ok_or_else(|| {
                InvalidInputFormat::new(format!("expected a nested array, got {}", type_name(value)))
            })?;
            if items.len() != len {
                return Err(InvalidInputFormat::new(format!(
                    "ragged array: expected {} elements, got {}",
                    len,
                    items.len()
                )));
            }
            for item in items {
                flatten_into(item, rest, missing, out)?;
            }
            Ok(())
        }
    }
}

fn describe(value: &Value, shape: &[usize]) -> String {
    if shape.is_empty() {
        type_name(value).to_string()
    } else {
        format!("an array of rank {}", shape.len())
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_equivalence() {
        let bare = json!([[1, 2, 3], [4, 5, 6]]);
        let instances = json!({ "instances": bare.clone() });
        let data = json!({ "data": bare.clone() });

        let expected = to_matrix(&bare, Missing::Reject).unwrap();
        for raw in [&bare, &instances, &data] {
            let payload = unwrap_payload(raw, NUMERIC_ENVELOPE).unwrap();
            assert_eq!(to_matrix(&payload, Missing::Reject).unwrap(), expected);
        }
    }

    #[test]
    fn test_instances_takes_precedence_over_data() {
        let raw = json!({ "data": [[9.0]], "instances": [[1.0]] });
        let payload = unwrap_payload(&raw, NUMERIC_ENVELOPE).unwrap();
        assert_eq!(*payload, json!([[1.0]]));
    }

    #[test]
    fn test_string_payload_equivalence() {
        let bare = json!([[1.5, 2.5]]);
        let encoded = Value::String(bare.to_string());
        let wrapped = json!({ "instances": bare.to_string() });
        let encoded_envelope = Value::String(json!({ "data": bare.clone() }).to_string());

        for raw in [&encoded, &wrapped, &encoded_envelope] {
            let payload = unwrap_payload(raw, NUMERIC_ENVELOPE).unwrap();
            assert_eq!(*payload, bare);
        }
    }

    #[test]
    fn test_unparsable_string_is_invalid_input() {
        let raw = json!({ "instances": "[[1, 2" });
        assert!(unwrap_payload(&raw, NUMERIC_ENVELOPE).is_err());
    }

    #[test]
    fn test_unrecognized_object_is_rejected() {
        let raw = json!({ "features": [[1, 2]] });
        let payload = unwrap_payload(&raw, NUMERIC_ENVELOPE).unwrap();
        let err = to_matrix(&payload, Missing::Reject).unwrap_err();
        assert!(err.to_string().contains("an object"));
    }

    #[test]
    fn test_matrix_shape_errors() {
        assert!(to_matrix(&json!([1, 2, 3]), Missing::Reject).is_err());
        assert!(to_matrix(&json!([[1, 2], [3]]), Missing::Reject).is_err());
        assert!(to_matrix(&json!([[1, "a"]]), Missing::Reject).is_err());
        assert!(to_matrix(&json!([[true, 1]]), Missing::Reject).is_err());
        assert!(to_matrix(&json!([]), Missing::Reject).is_err());
        assert!(to_matrix(&json!([[]]), Missing::Reject).is_err());
        assert!(to_matrix(&json!(42), Missing::Reject).is_err());
    }

    #[test]
    fn test_missing_values() {
        let raw = json!([[1.0, null]]);
        assert!(to_matrix(&raw, Missing::Reject).is_err());

        let matrix = to_matrix(&raw, Missing::AsNan).unwrap();
        assert_eq!(matrix[[0, 0]], 1.0);
        assert!(matrix[[0, 1]].is_nan());
    }

    #[test]
    fn test_tensor_any_rank() {
        let tensor = to_tensor(&json!([[[1, 2], [3, 4]], [[5, 6], [7, 8]]])).unwrap();
        assert_eq!(tensor.shape(), &[2, 2, 2]);
        assert_eq!(tensor[[1, 0, 1]], 6.0);

        let vector = to_tensor(&json!([0.5, 1.5])).unwrap();
        assert_eq!(vector.shape(), &[2]);

        assert!(to_tensor(&json!(3.0)).is_err());
        assert!(to_tensor(&json!([[1], [2, 3]])).is_err());
    }

    #[test]
    fn test_decode_body() {
        assert_eq!(decode_body(b"[1, 2]"), json!([1, 2]));
        assert_eq!(decode_body(b"\"quoted\""), json!("quoted"));
        assert_eq!(decode_body(b"hello there"), json!("hello there"));
    }
}
