//! CLI commands
//!
//! `serve` runs the HTTP server, `predict` runs one prediction locally and
//! `info` shows what a deployment would load.

mod info;
mod predict;
mod serve;

pub use info::info;
pub use predict::predict;
pub use serve::serve;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::adapters::build_handler;
use crate::config::{Framework, ServrConfig};
use crate::handler::ModelService;

/// servr - single-model inference server
#[derive(Parser)]
#[command(name = "servr")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (.yaml, .yml or .json)
    #[arg(long, short, global = true, env = "SERVR_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub model: ModelArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Model selection flags, overriding file and environment settings
#[derive(Args, Debug, Default)]
pub struct ModelArgs {
    /// Model framework (tabular, boosted-tree, deep-tensor, text-generation)
    #[arg(long, global = true)]
    pub framework: Option<Framework>,

    /// Directory holding the model artifact
    #[arg(long, global = true)]
    pub model_dir: Option<PathBuf>,

    /// Artifact file suffix
    #[arg(long, global = true)]
    pub model_format: Option<String>,

    /// Text-generation model id
    #[arg(long, global = true)]
    pub model_id: Option<String>,
}

impl ModelArgs {
    /// Apply the flags that were given
    pub fn apply(&self, config: &mut ServrConfig) {
        if let Some(framework) = self.framework {
            config.model.framework = framework;
        }
        if let Some(dir) = &self.model_dir {
            config.model.model_dir = dir.clone();
        }
        if let Some(format) = &self.model_format {
            config.model.model_format = Some(format.clone());
        }
        if let Some(model_id) = &self.model_id {
            config.text_generation.model_id = model_id.clone();
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load the model and start the inference server
    Serve {
        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
    },

    /// Load the model and run one prediction
    Predict {
        /// Request body file (reads stdin when omitted)
        #[arg(long, short)]
        input: Option<PathBuf>,
    },

    /// Show the resolved configuration and the artifact that would be loaded
    Info,
}

impl Cli {
    /// Configuration from file, environment and flags, in that order
    pub fn resolve_config(&self) -> Result<ServrConfig> {
        let mut config = ServrConfig::load(self.config.as_deref())?;
        self.model.apply(&mut config);
        Ok(config)
    }
}

/// Build and load the configured handler off the async runtime.
pub async fn load_service(config: ServrConfig) -> Result<Arc<dyn ModelService>> {
    tokio::task::spawn_blocking(move || -> Result<Arc<dyn ModelService>> {
        let mut service = build_handler(&config)?;
        service.load()?;
        Ok(Arc::from(service))
    })
    .await
    .context("Model loading task failed")?
}
