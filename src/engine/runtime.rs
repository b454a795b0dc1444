//! Generation runtime backed by an SGLang server process
//!
//! The runtime either launches `python -m sglang.launch_server` bound to one
//! accelerator, or attaches to an endpoint that is already running. Prompts
//! are sent as one batch to `/generate`.

use std::net::TcpListener;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::{GenerationConfig, TextGenerationConfig};

/// A loaded text-generation model.
pub trait GenerationRuntime: Send + Sync {
    /// Generate one completion per prompt, in input order.
    fn generate(&self, prompts: &[String]) -> Result<Vec<String>>;

    /// Where the runtime is reachable, for logs
    fn endpoint(&self) -> &str;
}

/// Brings a [`GenerationRuntime`] up from configuration.
pub trait RuntimeLauncher: Send + Sync {
    fn launch(&self, config: &TextGenerationConfig) -> Result<Box<dyn GenerationRuntime>>;
}

/// Launcher for [`SglangRuntime`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SglangLauncher;

impl RuntimeLauncher for SglangLauncher {
    fn launch(&self, config: &TextGenerationConfig) -> Result<Box<dyn GenerationRuntime>> {
        Ok(Box::new(SglangRuntime::start(config)?))
    }
}

const HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Sampling parameters in the shape `/generate` expects
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SamplingParams {
    pub max_new_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
    /// -1 disables top-k
    pub top_k: i64,
    pub repetition_penalty: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

impl From<&GenerationConfig> for SamplingParams {
    fn from(config: &GenerationConfig) -> Self {
        let (top_p, top_k) = if config.is_greedy() {
            (1.0, 1)
        } else {
            (config.top_p, config.top_k.map_or(-1, |k| k as i64))
        };
        Self {
            max_new_tokens: config.max_tokens,
            temperature: config.temperature,
            top_p,
            top_k,
            repetition_penalty: config.repeat_penalty,
            stop: config.stop_sequences.clone(),
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    text: &'a [String],
    sampling_params: &'a SamplingParams,
}

#[derive(Deserialize)]
struct GenerateOutput {
    text: String,
}

/// Arguments for `python -m sglang.launch_server`
pub fn launch_args(config: &TextGenerationConfig, port: u16) -> Vec<String> {
    vec![
        "-m".into(),
        "sglang.launch_server".into(),
        "--model-path".into(),
        config.model_id.clone(),
        "--tokenizer-path".into(),
        config.tokenizer_id().to_string(),
        "--device".into(),
        config.device.device_type().to_string(),
        "--base-gpu-id".into(),
        config.device.device_id().to_string(),
        "--mem-fraction-static".into(),
        config.mem_fraction_static.to_string(),
        "--host".into(),
        "127.0.0.1".into(),
        "--port".into(),
        port.to_string(),
    ]
}

/// Client for an SGLang generation server, owning the process when launched.
pub struct SglangRuntime {
    base_url: String,
    client: reqwest::blocking::Client,
    sampling: SamplingParams,
    child: Option<Child>,
}

impl SglangRuntime {
    /// Launch or attach according to `config`, then wait until healthy.
    pub fn start(config: &TextGenerationConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        let sampling = SamplingParams::from(&config.generation);
        let startup_timeout = Duration::from_secs(config.startup_timeout_secs);

        if let Some(endpoint) = &config.endpoint {
            let mut runtime = Self {
                base_url: endpoint.trim_end_matches('/').to_string(),
                client,
                sampling,
                child: None,
            };
            tracing::info!(endpoint = %runtime.base_url, "Attaching to generation server");
            runtime.wait_healthy(startup_timeout)?;
            return Ok(runtime);
        }

        let port = match config.port {
            Some(port) => port,
            None => free_port()?,
        };
        let args = launch_args(config, port);
        tracing::info!(
            model = %config.model_id,
            device = %config.device.device_type(),
            gpu = config.device.device_id(),
            mem_fraction_static = config.mem_fraction_static,
            port,
            "Launching generation server"
        );
        let child = Command::new(&config.python)
            .args(&args)
            .stdin(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to launch {}", config.python.display()))?;

        let mut runtime = Self {
            base_url: format!("http://127.0.0.1:{}", port),
            client,
            sampling,
            child: Some(child),
        };
        // dropping on error kills the child
        runtime.wait_healthy(startup_timeout)?;
        Ok(runtime)
    }

    fn wait_healthy(&mut self, timeout: Duration) -> Result<()> {
        let url = format!("{}/health", self.base_url);
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(child) = self.child.as_mut() {
                if let Some(status) = child.try_wait().context("Failed to poll generation server")? {
                    bail!("generation server exited during startup ({})", status);
                }
            }
            match self.client.get(&url).send() {
                Ok(response) if response.status().is_success() => {
                    tracing::info!(endpoint = %self.base_url, "Generation server is healthy");
                    return Ok(());
                }
                Ok(response) => {
                    tracing::debug!(status = %response.status(), "Generation server not ready")
                }
                Err(e) => tracing::debug!(error = %e, "Generation server not reachable yet"),
            }
            if Instant::now() >= deadline {
                bail!(
                    "generation server at {} not healthy after {:?}",
                    self.base_url,
                    timeout
                );
            }
            std::thread::sleep(HEALTH_POLL_INTERVAL);
        }
    }
}

impl GenerationRuntime for SglangRuntime {
    fn generate(&self, prompts: &[String]) -> Result<Vec<String>> {
        let url = format!("{}/generate", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&GenerateRequest {
                text: prompts,
                sampling_params: &self.sampling,
            })
            .send()
            .with_context(|| format!("Failed to reach {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            bail!("HTTP {} from {}: {}", status, url, body);
        }

        let outputs: Vec<GenerateOutput> = response
            .json()
            .context("Unexpected /generate response body")?;
        if outputs.len() != prompts.len() {
            return Err(anyhow!(
                "{} completions returned for {} prompts",
                outputs.len(),
                prompts.len()
            ));
        }
        Ok(outputs.into_iter().map(|o| o.text).collect())
    }

    fn endpoint(&self) -> &str {
        &self.base_url
    }
}

impl Drop for SglangRuntime {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            tracing::info!(pid = child.id(), "Stopping generation server");
            if let Err(e) = child.kill() {
                tracing::warn!(error = %e, "Failed to stop generation server");
            }
            let _ = child.wait();
        }
    }
}

fn free_port() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").context("Failed to reserve a port")?;
    Ok(listener.local_addr()?.port())
}
