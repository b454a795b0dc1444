//! Text-generation engine
//!
//! - [`GenerationRuntime`]: a loaded generation model answering prompt batches
//! - [`RuntimeLauncher`]: brings a runtime up from configuration
//! - [`SglangRuntime`]: SGLang server process on one accelerator

mod runtime;

pub use runtime::{
    launch_args, GenerationRuntime, RuntimeLauncher, SamplingParams, SglangLauncher,
    SglangRuntime,
};
