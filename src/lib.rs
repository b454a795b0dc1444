//! servr - single-model inference server
//!
//! servr loads one model artifact into memory and serves predictions for it
//! through a uniform handler contract.
//!
//! # Architecture
//!
//! - **handler**: lifecycle (unloaded → loaded) and the
//!   `preprocess → infer → postprocess` pipeline
//! - **adapters**: tabular estimators, boosted trees, tensor networks and
//!   text generation behind one trait
//! - **model** / **loader**: in-memory model representations and artifact
//!   discovery
//! - **engine**: the text-generation runtime process
//! - **server** / **cli**: HTTP and command-line wiring
//!
//! # Example
//!
//! ```bash
//! # Serve an XGBoost model from /opt/ml/model
//! servr serve --framework xgboost --port 8080
//!
//! # One prediction from stdin
//! echo '{"instances": [[1, 2, 3]]}' | servr predict --model-dir ./model
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod engine;
pub mod handler;
pub mod loader;
pub mod model;
pub mod server;

// Re-export key types
pub use adapters::build_handler;
pub use config::{Framework, ServrConfig};
pub use handler::{
    Adapter, Handler, InferenceFailure, InvalidInputFormat, LoadError, ModelService,
    PredictError, PredictionResponse,
};
