//! Deployment info command

use std::path::Path;

use anyhow::Result;

use crate::adapters::artifact_location;
use crate::config::{Framework, ServrConfig};
use crate::loader;

/// Show the resolved configuration and the artifact that would be loaded
pub fn info(config: ServrConfig) -> Result<()> {
    println!("Framework: {}", config.model.framework);
    println!("Location: {}\n", artifact_location(&config).display());

    println!("Configuration:");
    for line in serde_yaml::to_string(&config)?.lines() {
        println!("  {}", line);
    }
    println!();

    match config.model.framework {
        Framework::TextGeneration => {
            let tg = &config.text_generation;
            println!("Model id: {}", tg.model_id);
            println!("Tokenizer: {}", tg.tokenizer_id());
            println!(
                "Device: {}:{} (mem_fraction_static {})",
                tg.device.device_type(),
                tg.device.device_id(),
                tg.mem_fraction_static
            );
            match &tg.endpoint {
                Some(endpoint) => println!("Runtime: attach to {}", endpoint),
                None => println!("Runtime: launch with {}", tg.python.display()),
            }
        }
        _ => print_artifacts(&config.model.model_dir, config.model.model_format(), &config),
    }

    config.validate()?;
    Ok(())
}

fn print_artifacts(dir: &Path, suffix: &str, config: &ServrConfig) {
    let files = loader::find_artifacts(dir, suffix);
    match files.first() {
        Some(first) => {
            println!("Artifact: {}", first.display());
            if let Ok(metadata) = std::fs::metadata(first) {
                let size_mb = metadata.len() as f64 / (1024.0 * 1024.0);
                println!("File size: {:.2} MB", size_mb);
            }
            if files.len() > 1 {
                println!("({} files match *{}; the first is loaded)", files.len(), suffix);
            }
        }
        None => match loader::find_saved_model(dir) {
            Some(manifest) if config.model.framework == Framework::DeepTensor => {
                println!("Artifact: saved model ({})", manifest.display());
            }
            _ => println!("Artifact: none matching *{} in {}", suffix, dir.display()),
        },
    }
}
