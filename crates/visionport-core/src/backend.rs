use anyhow::Result;

use crate::{ModelArtifact, ModelSpec, PredictionOptions, Tensor};

#[derive(Clone, Copy, Debug, Default)]
pub struct BackendCapabilities {
    pub supports_dynamic_shapes: bool,
    /// Sessions keep state between runs and need an explicit reset.
    pub stateful_sessions: bool,
}

pub trait Backend: Send + Sync + 'static {
    type Model: BackendModel;

    fn name(&self) -> &'static str;
    fn load(&self, artifact: &ModelArtifact, options: &PredictionOptions) -> Result<Self::Model>;
    fn capabilities(&self) -> BackendCapabilities;
}

/// A loaded model. Dropping it releases the runtime handle.
pub trait BackendModel: Send + 'static {
    fn spec(&self) -> &ModelSpec;

    /// Inputs are already batched; the model never reshapes them.
    fn infer(&mut self, inputs: Vec<Tensor>) -> Result<Vec<Tensor>>;

    fn reset(&mut self) -> Result<()> {
        Ok(())
    }
}
