//! One-shot prediction command

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::config::ServrConfig;
use crate::handler::payload;

/// Load the model, predict one request body and print the response
pub async fn predict(config: ServrConfig, input: Option<PathBuf>) -> Result<()> {
    let body = match &input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read request from stdin")?;
            buf
        }
    };
    let raw = payload::decode_body(body.trim_end().as_bytes());

    let service = super::load_service(config).await?;
    let response = tokio::task::spawn_blocking(move || service.predict(&raw))
        .await
        .context("Prediction task failed")??;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
