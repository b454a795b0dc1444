//! Model selection settings

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Model family served by a deployment.
///
/// Chosen once from configuration at startup; a running server never
/// switches framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Framework {
    /// Classic estimators (linear, logistic, decision tree)
    #[serde(alias = "sklearn")]
    Tabular,
    /// Gradient-boosted tree ensembles in XGBoost JSON format
    #[serde(alias = "xgboost")]
    BoostedTree,
    /// Dense tensor networks (packaged file or saved-model directory)
    #[serde(alias = "tensorflow")]
    DeepTensor,
    /// Autoregressive text generation through a generation runtime
    #[serde(alias = "transformers")]
    TextGeneration,
}

impl Framework {
    pub const ALL: [Framework; 4] = [
        Framework::Tabular,
        Framework::BoostedTree,
        Framework::DeepTensor,
        Framework::TextGeneration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Framework::Tabular => "tabular",
            Framework::BoostedTree => "boosted-tree",
            Framework::DeepTensor => "deep-tensor",
            Framework::TextGeneration => "text-generation",
        }
    }

    /// Artifact suffix used when none is configured
    pub fn default_model_format(&self) -> Option<&'static str> {
        match self {
            Framework::Tabular => Some(".joblib"),
            Framework::BoostedTree => Some(".json"),
            Framework::DeepTensor => Some(".safetensors"),
            Framework::TextGeneration => None,
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Framework {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tabular" | "sklearn" => Ok(Framework::Tabular),
            "boosted-tree" | "xgboost" => Ok(Framework::BoostedTree),
            "deep-tensor" | "tensorflow" => Ok(Framework::DeepTensor),
            "text-generation" | "transformers" => Ok(Framework::TextGeneration),
            other => Err(anyhow!(
                "unknown framework '{}'; expected one of: {}",
                other,
                Framework::ALL.map(|f| f.as_str()).join(", ")
            )),
        }
    }
}

/// Where the model lives and how it is discovered
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model family
    #[serde(default = "default_framework")]
    pub framework: Framework,

    /// Directory holding the model artifact(s)
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    /// Artifact file suffix (e.g. ".joblib", ".json"). Framework default if unset.
    #[serde(default)]
    pub model_format: Option<String>,

    /// Try the secondary loader when the primary one rejects the file
    #[serde(default = "default_true")]
    pub allow_format_fallback: bool,
}

fn default_framework() -> Framework {
    Framework::Tabular
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("/opt/ml/model")
}

fn default_true() -> bool {
    true
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            framework: default_framework(),
            model_dir: default_model_dir(),
            model_format: None,
            allow_format_fallback: true,
        }
    }
}

impl ModelConfig {
    /// Effective artifact suffix
    pub fn model_format(&self) -> &str {
        self.model_format
            .as_deref()
            .or_else(|| self.framework.default_model_format())
            .unwrap_or("")
    }
}
