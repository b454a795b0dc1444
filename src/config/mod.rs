//! Configuration system for servr
//!
//! Settings come from a YAML or JSON file, then environment variables, then
//! command-line flags (applied by the CLI), each layer overriding the last.

mod generation;
mod model;
mod server;

pub use generation::{DeviceConfig, GenerationConfig, TextGenerationConfig};
pub use model::{Framework, ModelConfig};
pub use server::ServerConfig;

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable selecting the framework
pub const ENV_FRAMEWORK: &str = "SERVR_FRAMEWORK";
/// Environment variable holding the model directory
pub const ENV_MODEL_DIR: &str = "SERVR_MODEL_DIR";
/// Environment variable holding the artifact suffix
pub const ENV_MODEL_FORMAT: &str = "SERVR_MODEL_FORMAT";
/// Environment variable holding the text-generation model id
pub const ENV_MODEL_ID: &str = "SERVR_MODEL_ID";
/// Environment variable holding the server port
pub const ENV_PORT: &str = "SERVR_PORT";

/// servr configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServrConfig {
    /// Which model is served and where it lives
    #[serde(default)]
    pub model: ModelConfig,

    /// Text-generation runtime settings (only for `text-generation`)
    #[serde(default)]
    pub text_generation: TextGenerationConfig,

    /// HTTP server settings (only for `servr serve`)
    #[serde(default)]
    pub server: ServerConfig,
}

impl ServrConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Load from an optional file (format chosen by extension), then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
                match ext {
                    "yaml" | "yml" => Self::from_yaml(path),
                    "json" => Self::from_json(path),
                    _ => Err(anyhow!("Unsupported config file format: .{}", ext)),
                }
                .with_context(|| format!("Failed to read config {}", path.display()))?
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(framework) = lookup(ENV_FRAMEWORK) {
            self.model.framework = framework.parse()?;
        }
        if let Some(dir) = lookup(ENV_MODEL_DIR) {
            self.model.model_dir = PathBuf::from(dir);
        }
        if let Some(format) = lookup(ENV_MODEL_FORMAT) {
            self.model.model_format = Some(format);
        }
        if let Some(model_id) = lookup(ENV_MODEL_ID) {
            self.text_generation.model_id = model_id;
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.server.port = port
                .parse()
                .with_context(|| format!("{} is not a valid port: {}", ENV_PORT, port))?;
        }
        Ok(())
    }

    /// Check settings that cannot be expressed through serde defaults
    pub fn validate(&self) -> Result<()> {
        if self.model.framework == Framework::TextGeneration {
            if self.text_generation.model_id.is_empty() {
                return Err(anyhow!(
                    "text-generation requires text_generation.model_id (or {})",
                    ENV_MODEL_ID
                ));
            }
            let fraction = self.text_generation.mem_fraction_static;
            if !(fraction > 0.0 && fraction <= 1.0) {
                return Err(anyhow!(
                    "mem_fraction_static must be in (0, 1], got {}",
                    fraction
                ));
            }
        }
        if self.server.max_concurrent_requests == 0 {
            return Err(anyhow!("server.max_concurrent_requests must be at least 1"));
        }
        Ok(())
    }
}
