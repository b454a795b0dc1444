//! HTTP server settings
//!
//! Request limits are enforced by the server layer around `/invocations`.
//! The model handler has no notion of them and runs each prediction to
//! completion.

use serde::{Deserialize, Serialize};

/// Listener and middleware settings for `servr serve`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Maximum predictions running at once
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,

    /// Seconds before the server answers 408; the prediction thread keeps running
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,

    /// Allow cross-origin calls to `/ping` and `/invocations`
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Trace every request through tower-http
    #[serde(default = "default_true")]
    pub request_logging: bool,

    /// Bodies larger than this are refused with 413 before decoding
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

fn default_port() -> u16 {
    8080
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_max_concurrent() -> usize {
    // every in-flight prediction shares one loaded model; keep it small
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(4)
}

fn default_timeout() -> u64 {
    120
}

fn default_true() -> bool {
    true
}

fn default_max_body_size() -> usize {
    10 * 1024 * 1024 // 10 MB
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            max_concurrent_requests: default_max_concurrent(),
            request_timeout_secs: default_timeout(),
            cors_enabled: true,
            request_logging: true,
            max_body_size: default_max_body_size(),
        }
    }
}

impl ServerConfig {
    /// `host:port` to bind
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
