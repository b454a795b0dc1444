//! Dense feed-forward networks
//!
//! Two artifact shapes share the same layer implementation:
//!
//! - a packaged single `.safetensors` file holding `<layer>.kernel` /
//!   `<layer>.bias` tensors, with the layer order in the `layers` metadata
//!   entry ([`Sequential`])
//! - a saved-model directory: `saved_model.json` describing named signatures
//!   over the tensors in `variables/variables.safetensors`
//!   ([`SavedModel`], [`ServingSignature`])

use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use ndarray::{Array1, Array2, ArrayD, Ix1, Ix2, IxDyn};
use serde::Deserialize;

use crate::loader::{read_safetensors, TensorFile};

/// Signature bound by the serving handler
pub const SERVING_DEFAULT: &str = "serving_default";

/// Variables file inside a saved-model directory
pub const VARIABLES_FILE: &str = "variables/variables.safetensors";

/// Element-wise (or, for softmax, per-row) output nonlinearity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Linear,
    Relu,
    Sigmoid,
    Tanh,
    Softmax,
}

impl Activation {
    fn apply(self, x: &mut Array2<f32>) {
        match self {
            Activation::Linear => {}
            Activation::Relu => x.mapv_inplace(|v| v.max(0.0)),
            Activation::Sigmoid => x.mapv_inplace(|v| 1.0 / (1.0 + (-v).exp())),
            Activation::Tanh => x.mapv_inplace(f32::tanh),
            Activation::Softmax => {
                for mut row in x.rows_mut() {
                    let max = row.fold(f32::NEG_INFINITY, |a, b| a.max(*b));
                    row.mapv_inplace(|v| (v - max).exp());
                    let sum = row.sum();
                    row.mapv_inplace(|v| v / sum);
                }
            }
        }
    }
}

/// Layer entry in the `layers` metadata or a signature
#[derive(Debug, Clone, Deserialize)]
pub struct LayerSpec {
    pub name: String,
    #[serde(default)]
    pub activation: Activation,
}

/// Fully connected layer: `activation(x · kernel + bias)`
#[derive(Debug, Clone)]
pub struct Dense {
    name: String,
    kernel: Array2<f32>,
    bias: Array1<f32>,
    activation: Activation,
}

impl Dense {
    fn from_tensors(tensors: &TensorFile, spec: &LayerSpec) -> Result<Self> {
        let kernel = tensors
            .tensor(&format!("{}.kernel", spec.name))?
            .clone()
            .into_dimensionality::<Ix2>()
            .map_err(|_| anyhow!("layer '{}': kernel must be 2-D [in, out]", spec.name))?;
        let bias = tensors
            .tensor(&format!("{}.bias", spec.name))?
            .clone()
            .into_dimensionality::<Ix1>()
            .map_err(|_| anyhow!("layer '{}': bias must be 1-D [out]", spec.name))?;

        if bias.len() != kernel.ncols() {
            bail!(
                "layer '{}': bias has {} units but kernel has {}",
                spec.name,
                bias.len(),
                kernel.ncols()
            );
        }

        Ok(Self {
            name: spec.name.clone(),
            kernel,
            bias,
            activation: spec.activation,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_dim(&self) -> usize {
        self.kernel.nrows()
    }

    pub fn output_dim(&self) -> usize {
        self.kernel.ncols()
    }

    /// Apply over the last axis of `x`, keeping the leading axes.
    pub fn forward(&self, x: &ArrayD<f32>) -> Result<ArrayD<f32>, String> {
        let Some(&width) = x.shape().last() else {
            return Err(format!("layer '{}' received a scalar", self.name));
        };
        if width != self.input_dim() {
            return Err(format!(
                "layer '{}' expects last dimension {}, got {} (input shape {:?})",
                self.name,
                self.input_dim(),
                width,
                x.shape()
            ));
        }

        let leading = &x.shape()[..x.ndim() - 1];
        let rows: usize = leading.iter().product();
        let flat = x
            .to_shape((rows, width))
            .map_err(|e| format!("layer '{}': {}", self.name, e))?;

        let mut out = flat.dot(&self.kernel) + &self.bias;
        self.activation.apply(&mut out);

        let mut shape = leading.to_vec();
        shape.push(self.output_dim());
        out.into_shape_with_order(IxDyn(&shape))
            .map_err(|e| format!("layer '{}': {}", self.name, e))
    }
}

fn build_layers(tensors: &TensorFile, specs: &[LayerSpec]) -> Result<Vec<Dense>> {
    if specs.is_empty() {
        bail!("network has no layers");
    }
    let layers = specs
        .iter()
        .map(|spec| Dense::from_tensors(tensors, spec))
        .collect::<Result<Vec<_>>>()?;

    for pair in layers.windows(2) {
        if pair[0].output_dim() != pair[1].input_dim() {
            bail!(
                "layer '{}' outputs {} units but '{}' expects {}",
                pair[0].name(),
                pair[0].output_dim(),
                pair[1].name(),
                pair[1].input_dim()
            );
        }
    }
    Ok(layers)
}

/// Stack of dense layers loaded from one packaged file
#[derive(Debug, Clone)]
pub struct Sequential {
    layers: Vec<Dense>,
}

impl Sequential {
    /// Build from a tensor file whose `layers` metadata lists the layer order.
    pub fn from_tensor_file(tensors: &TensorFile) -> Result<Self> {
        let raw = tensors
            .metadata("layers")
            .ok_or_else(|| anyhow!("missing 'layers' metadata entry"))?;
        let specs: Vec<LayerSpec> =
            serde_json::from_str(raw).context("invalid 'layers' metadata entry")?;
        Ok(Self {
            layers: build_layers(tensors, &specs)?,
        })
    }

    /// Load a packaged `.safetensors` network
    pub fn load(path: &Path) -> Result<Self> {
        Self::from_tensor_file(&read_safetensors(path)?)
    }

    pub fn layers(&self) -> &[Dense] {
        &self.layers
    }

    pub fn input_dim(&self) -> usize {
        self.layers[0].input_dim()
    }

    /// Forward pass over a batch
    pub fn predict(&self, batch: &ArrayD<f32>) -> Result<ArrayD<f32>, String> {
        let mut x = self.layers[0].forward(batch)?;
        for layer in &self.layers[1..] {
            x = layer.forward(&x)?;
        }
        Ok(x)
    }
}

// saved_model.json

#[derive(Debug, Deserialize)]
struct Manifest {
    signatures: HashMap<String, SignatureDef>,
}

#[derive(Debug, Deserialize)]
struct SignatureDef {
    input: String,
    outputs: Vec<OutputDef>,
    layers: Vec<LayerSpec>,
}

/// A named output taps the activation of one layer
#[derive(Debug, Deserialize)]
struct OutputDef {
    name: String,
    layer: String,
}

/// Callable graph bound to one signature of a saved model
#[derive(Debug, Clone)]
pub struct ServingSignature {
    input_name: String,
    layers: Vec<Dense>,
    /// Output name and the index of the layer it taps
    outputs: Vec<(String, usize)>,
}

impl ServingSignature {
    fn from_def(tensors: &TensorFile, def: &SignatureDef) -> Result<Self> {
        let layers = build_layers(tensors, &def.layers)?;
        if def.outputs.is_empty() {
            bail!("signature declares no outputs");
        }
        let outputs = def
            .outputs
            .iter()
            .map(|out| {
                layers
                    .iter()
                    .position(|l| l.name() == out.layer)
                    .map(|i| (out.name.clone(), i))
                    .ok_or_else(|| {
                        anyhow!("output '{}' taps unknown layer '{}'", out.name, out.layer)
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            input_name: def.input.clone(),
            layers,
            outputs,
        })
    }

    pub fn input_name(&self) -> &str {
        &self.input_name
    }

    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(|(name, _)| name.as_str())
    }

    /// Run the graph, returning every declared output in order.
    pub fn call(&self, input: &ArrayD<f32>) -> Result<Vec<(String, ArrayD<f32>)>, String> {
        let last = self.outputs.iter().map(|(_, i)| *i).max().unwrap_or(0);
        let mut activations = Vec::with_capacity(last + 1);
        let mut x = self.layers[0].forward(input)?;
        for layer in &self.layers[1..=last] {
            let next = layer.forward(&x)?;
            activations.push(std::mem::replace(&mut x, next));
        }
        activations.push(x);

        Ok(self
            .outputs
            .iter()
            .map(|(name, i)| (name.clone(), activations[*i].clone()))
            .collect())
    }

    /// First declared output
    pub fn predict(&self, input: &ArrayD<f32>) -> Result<ArrayD<f32>, String> {
        self.call(input)?
            .into_iter()
            .next()
            .map(|(_, tensor)| tensor)
            .ok_or_else(|| "signature produced no outputs".to_string())
    }
}

/// Saved-model directory with all its signatures
#[derive(Debug, Clone)]
pub struct SavedModel {
    signatures: HashMap<String, ServingSignature>,
}

impl SavedModel {
    /// Load from the directory containing `saved_model.json`
    pub fn load(dir: &Path) -> Result<Self> {
        let manifest_path = dir.join(crate::loader::SAVED_MODEL_MANIFEST);
        let raw = std::fs::read_to_string(&manifest_path)
            .with_context(|| format!("Failed to read {}", manifest_path.display()))?;
        let manifest: Manifest = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid manifest {}", manifest_path.display()))?;

        let tensors = read_safetensors(dir.join(VARIABLES_FILE))?;

        let signatures = manifest
            .signatures
            .iter()
            .map(|(name, def)| {
                ServingSignature::from_def(&tensors, def)
                    .with_context(|| format!("signature '{}'", name))
                    .map(|sig| (name.clone(), sig))
            })
            .collect::<Result<HashMap<_, _>>>()?;

        Ok(Self { signatures })
    }

    pub fn signature_names(&self) -> impl Iterator<Item = &str> {
        self.signatures.keys().map(String::as_str)
    }

    /// Take ownership of one signature
    pub fn into_signature(mut self, name: &str) -> Result<ServingSignature> {
        if let Some(signature) = self.signatures.remove(name) {
            return Ok(signature);
        }
        let mut available: Vec<&str> = self.signature_names().collect();
        available.sort_unstable();
        bail!(
            "saved model has no '{}' signature (available: {})",
            name,
            available.join(", ")
        )
    }
}

/// Loaded deep-tensor artifact
#[derive(Debug, Clone)]
pub enum DeepModel {
    Packaged(Sequential),
    Signature(ServingSignature),
}

impl DeepModel {
    pub fn predict(&self, batch: &ArrayD<f32>) -> Result<ArrayD<f32>, String> {
        match self {
            DeepModel::Packaged(model) => model.predict(batch),
            DeepModel::Signature(signature) => signature.predict(batch),
        }
    }
}
