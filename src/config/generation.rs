//! Text-generation runtime settings

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Device configuration for the generation runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeviceConfig {
    /// Simple device string (e.g., "cuda:0", "cpu")
    Simple(String),
    /// Detailed device configuration
    Detailed {
        /// Device type: "cuda", "cpu"
        device_type: String,
        /// Device ID (for multi-GPU)
        #[serde(default)]
        device_id: usize,
    },
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig::Simple("cuda".to_string())
    }
}

impl DeviceConfig {
    /// Get device type ("cuda", "cpu", ...)
    pub fn device_type(&self) -> &str {
        match self {
            DeviceConfig::Simple(s) => s.split(':').next().unwrap_or(s),
            DeviceConfig::Detailed { device_type, .. } => device_type,
        }
    }

    /// Get device ID (for multi-GPU)
    pub fn device_id(&self) -> usize {
        match self {
            DeviceConfig::Simple(s) => s
                .split_once(':')
                .and_then(|(_, id)| id.parse().ok())
                .unwrap_or(0),
            DeviceConfig::Detailed { device_id, .. } => *device_id,
        }
    }
}

/// Sampling parameters sent with every generate call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Maximum number of new tokens per prompt
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Temperature for sampling (higher = more random)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Top-p nucleus sampling threshold
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Top-k sampling (None = disabled)
    #[serde(default)]
    pub top_k: Option<usize>,

    /// Repetition penalty (1.0 = no penalty)
    #[serde(default = "default_repeat_penalty")]
    pub repeat_penalty: f32,

    /// Stop sequences
    #[serde(default)]
    pub stop_sequences: Vec<String>,
}

fn default_max_tokens() -> usize {
    128
}

fn default_temperature() -> f32 {
    1.0
}

fn default_top_p() -> f32 {
    1.0
}

fn default_repeat_penalty() -> f32 {
    1.0
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: None,
            repeat_penalty: default_repeat_penalty(),
            stop_sequences: Vec::new(),
        }
    }
}

impl GenerationConfig {
    /// Temperature 0 selects greedy decoding
    pub fn is_greedy(&self) -> bool {
        self.temperature == 0.0
    }
}

/// Text-generation runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextGenerationConfig {
    /// Model identifier handed to the runtime (hub id or local path)
    #[serde(default)]
    pub model_id: String,

    /// Tokenizer identifier (defaults to `model_id`)
    #[serde(default)]
    pub tokenizer_id: Option<String>,

    /// Accelerator the runtime binds to
    #[serde(default)]
    pub device: DeviceConfig,

    /// Fraction of device memory reserved statically for weights and KV cache
    #[serde(default = "default_mem_fraction")]
    pub mem_fraction_static: f32,

    /// Python interpreter used to launch the runtime server
    #[serde(default = "default_python")]
    pub python: PathBuf,

    /// Attach to an already running runtime instead of launching one
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Port for a launched runtime (a free port is picked if unset)
    #[serde(default)]
    pub port: Option<u16>,

    /// How long to wait for a launched runtime to become healthy
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_secs: u64,

    /// Timeout of a single generate call
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Sampling parameters
    #[serde(default)]
    pub generation: GenerationConfig,
}

fn default_mem_fraction() -> f32 {
    0.8
}

fn default_python() -> PathBuf {
    PathBuf::from("python3")
}

fn default_startup_timeout() -> u64 {
    600
}

fn default_request_timeout() -> u64 {
    120
}

impl Default for TextGenerationConfig {
    fn default() -> Self {
        Self {
            model_id: String::new(),
            tokenizer_id: None,
            device: DeviceConfig::default(),
            mem_fraction_static: default_mem_fraction(),
            python: default_python(),
            endpoint: None,
            port: None,
            startup_timeout_secs: default_startup_timeout(),
            request_timeout_secs: default_request_timeout(),
            generation: GenerationConfig::default(),
        }
    }
}

impl TextGenerationConfig {
    /// Tokenizer identifier, falling back to the model identifier
    pub fn tokenizer_id(&self) -> &str {
        self.tokenizer_id.as_deref().unwrap_or(&self.model_id)
    }
}
