//! Framework adapters
//!
//! One [`Adapter`](crate::handler::Adapter) per supported model family. The
//! family is chosen once from configuration by [`build_handler`].

mod boosted;
mod tabular;
mod tensor;
mod textgen;

pub use boosted::BoostedTreeAdapter;
pub use tabular::TabularAdapter;
pub use tensor::DeepTensorAdapter;
pub use textgen::TextGenerationAdapter;

use std::path::PathBuf;

use anyhow::Result;

use crate::config::{Framework, ServrConfig};
use crate::handler::{Handler, ModelService};

/// Where the handler for `config` looks for its artifact
pub fn artifact_location(config: &ServrConfig) -> PathBuf {
    match config.model.framework {
        Framework::TextGeneration => PathBuf::from(&config.text_generation.model_id),
        _ => config.model.model_dir.clone(),
    }
}

/// Build an unloaded handler for the configured framework.
pub fn build_handler(config: &ServrConfig) -> Result<Box<dyn ModelService>> {
    config.validate()?;
    let path = artifact_location(config);

    let service: Box<dyn ModelService> = match config.model.framework {
        Framework::Tabular => Box::new(Handler::new(TabularAdapter::from_config(&config.model), path)),
        Framework::BoostedTree => Box::new(Handler::new(
            BoostedTreeAdapter::from_config(&config.model),
            path,
        )),
        Framework::DeepTensor => Box::new(Handler::new(
            DeepTensorAdapter::from_config(&config.model),
            path,
        )),
        Framework::TextGeneration => Box::new(Handler::new(
            TextGenerationAdapter::new(config.text_generation.clone()),
            path,
        )),
    };

    tracing::debug!(
        framework = %service.framework(),
        path = %service.artifact_path().display(),
        "Created model handler"
    );
    Ok(service)
}
