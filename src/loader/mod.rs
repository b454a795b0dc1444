//! Model artifact loading utilities
//!
//! - Discovery of artifact files in the model directory by suffix
//! - SafeTensors reading for the tensor networks
//!
//! Format-specific construction lives with each adapter.

mod detect;
pub(crate) mod safetensors;

pub use detect::{find_artifact, find_artifacts, find_saved_model, SAVED_MODEL_MANIFEST};
pub use self::safetensors::{parse_safetensors, read_safetensors, TensorFile};

use std::path::Path;

use crate::handler::LoadError;

/// Read a text artifact, mapping IO errors to [`LoadError::LoadFailure`]
pub fn read_to_string(path: &Path) -> Result<String, LoadError> {
    std::fs::read_to_string(path).map_err(|e| LoadError::failure(path, e))
}
