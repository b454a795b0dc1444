//! In-memory model representations evaluated by the adapters.
//!
//! - [`tabular`]: classic estimators (linear, logistic, decision tree)
//! - [`booster`]: gradient-boosted tree ensembles in XGBoost JSON form
//! - [`network`]: dense feed-forward networks from safetensors

pub mod booster;
pub mod network;
pub mod tabular;

pub use booster::{BoostedPrediction, Booster, DMatrix, ObjectiveKind};
pub use network::{Activation, DeepModel, SavedModel, Sequential, ServingSignature, SERVING_DEFAULT};
pub use tabular::{Label, TabularModel, TabularOutput};
