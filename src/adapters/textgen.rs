//! Text generation through a generation runtime
//!
//! There is no artifact file: loading brings up the runtime for the configured
//! model id. Requests are prompts, not numbers, so no JSON decoding happens on
//! the payload; a string is a single prompt.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use crate::config::{Framework, TextGenerationConfig};
use crate::engine::{GenerationRuntime, RuntimeLauncher, SglangLauncher};
use crate::handler::payload::{self, type_name};
use crate::handler::{
    Adapter, InferenceFailure, InvalidInputFormat, LoadError, PredictionResponse,
};

pub struct TextGenerationAdapter {
    config: TextGenerationConfig,
    launcher: Arc<dyn RuntimeLauncher>,
}

impl TextGenerationAdapter {
    /// Adapter launching an SGLang server
    pub fn new(config: TextGenerationConfig) -> Self {
        Self::with_launcher(config, Arc::new(SglangLauncher))
    }

    pub fn with_launcher(config: TextGenerationConfig, launcher: Arc<dyn RuntimeLauncher>) -> Self {
        Self { config, launcher }
    }

    pub fn config(&self) -> &TextGenerationConfig {
        &self.config
    }
}

impl Adapter for TextGenerationAdapter {
    type Artifact = Arc<dyn GenerationRuntime>;
    type Input = Vec<String>;
    type Output = Vec<String>;

    fn framework(&self) -> Framework {
        Framework::TextGeneration
    }

    fn load(&self, artifact_path: &Path) -> Result<Arc<dyn GenerationRuntime>, LoadError> {
        tracing::info!(
            model = %self.config.model_id,
            device = %self.config.device.device_type(),
            mem_fraction_static = self.config.mem_fraction_static,
            "Starting generation runtime"
        );
        let runtime = self
            .launcher
            .launch(&self.config)
            .map_err(|e| LoadError::failure(artifact_path, format!("{:#}", e)))?;
        tracing::info!(endpoint = runtime.endpoint(), "Generation runtime ready");
        Ok(Arc::from(runtime))
    }

    fn preprocess(&self, raw: &Value) -> Result<Vec<String>, InvalidInputFormat> {
        match payload::extract_envelope(raw, payload::TEXT_ENVELOPE) {
            Value::String(prompt) => Ok(vec![prompt.clone()]),
            Value::Array(items) if !items.is_empty() => items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    item.as_str().map(str::to_owned).ok_or_else(|| {
                        InvalidInputFormat::new(format!(
                            "prompt {} is {}, expected a string",
                            i,
                            type_name(item)
                        ))
                    })
                })
                .collect(),
            Value::Array(_) => Err(InvalidInputFormat::new("prompt list is empty")),
            other => Err(InvalidInputFormat::new(format!(
                "expected a prompt string or a list of prompts, got {}",
                type_name(other)
            ))),
        }
    }

    fn infer(
        &self,
        runtime: &Arc<dyn GenerationRuntime>,
        prompts: Vec<String>,
    ) -> Result<Vec<String>, InferenceFailure> {
        let outputs = runtime
            .generate(&prompts)
            .map_err(|e| InferenceFailure::new(format!("{:#}", e)))?;
        if outputs.len() != prompts.len() {
            return Err(InferenceFailure::new(format!(
                "runtime returned {} completions for {} prompts",
                outputs.len(),
                prompts.len()
            )));
        }
        Ok(outputs)
    }

    fn postprocess(&self, output: Vec<String>) -> Result<PredictionResponse, InferenceFailure> {
        Ok(PredictionResponse::from_strings(output))
    }
}
