//! SafeTensors reading
//!
//! Reads every tensor of a `.safetensors` file into an owned f32 array and
//! keeps the free-form header metadata, which the network loaders use to
//! describe layer order and activations.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use ndarray::{ArrayD, IxDyn};
use ::safetensors::{Dtype, SafeTensors};

/// Owned contents of a SafeTensors file
#[derive(Debug, Clone, Default)]
pub struct TensorFile {
    tensors: HashMap<String, ArrayD<f32>>,
    metadata: HashMap<String, String>,
}

impl TensorFile {
    /// Look up a tensor by name
    pub fn tensor(&self, name: &str) -> Result<&ArrayD<f32>> {
        self.tensors
            .get(name)
            .ok_or_else(|| anyhow!("tensor '{}' not found", name))
    }

    /// Header metadata value
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Number of tensors
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}

/// Read a SafeTensors file into memory
pub fn read_safetensors<P: AsRef<Path>>(path: P) -> Result<TensorFile> {
    let path = path.as_ref();
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let file = parse_safetensors(&bytes)?;
    if file.is_empty() {
        bail!("{} holds no tensors", path.display());
    }
    tracing::debug!(path = %path.display(), tensors = file.len(), "Read SafeTensors file");
    Ok(file)
}

/// Parse SafeTensors bytes
pub fn parse_safetensors(bytes: &[u8]) -> Result<TensorFile> {
    let (_, header) =
        SafeTensors::read_metadata(bytes).map_err(|e| anyhow!("Invalid SafeTensors header: {}", e))?;
    let metadata = header.metadata().clone().unwrap_or_default();

    let st = SafeTensors::deserialize(bytes)
        .map_err(|e| anyhow!("Failed to open SafeTensors: {}", e))?;

    let mut tensors = HashMap::new();
    for (name, view) in st.tensors() {
        let values = decode(view.dtype(), view.data())
            .with_context(|| format!("tensor '{}'", name))?;
        let array = ArrayD::from_shape_vec(IxDyn(view.shape()), values)
            .map_err(|e| anyhow!("tensor '{}' has inconsistent shape: {}", name, e))?;
        tensors.insert(name, array);
    }

    Ok(TensorFile { tensors, metadata })
}

fn decode(dtype: Dtype, data: &[u8]) -> Result<Vec<f32>> {
    match dtype {
        Dtype::F32 => Ok(data
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect()),
        Dtype::F64 => Ok(data
            .chunks_exact(8)
            .map(|b| {
                f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f32
            })
            .collect()),
        other => Err(anyhow!("unsupported dtype {:?}; expected F32 or F64", other)),
    }
}
