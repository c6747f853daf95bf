//! Predictor runtime for vision models.
//!
//! * [`artifact`] resolves and fetches model files
//! * [`binding`] owns the backend handle
//! * [`normalize`] stacks per-sample tensors into a batch
//! * [`decode`] turns raw outputs into per-modality features
//! * [`predictor`] drives the download/load/predict lifecycle
//! * [`registry`], [`scheduler`] and [`worker`] host predictors in a process

pub mod artifact;
pub mod binding;
pub mod decode;
pub mod fetch;
pub mod labels;
pub mod normalize;
pub mod predictor;
pub mod registry;
pub mod request;
pub mod scheduler;
pub mod worker;

pub use artifact::*;
pub use binding::*;
pub use decode::*;
pub use fetch::*;
pub use labels::*;
pub use normalize::*;
pub use predictor::*;
pub use registry::*;
pub use request::*;
pub use scheduler::*;
pub use worker::*;
