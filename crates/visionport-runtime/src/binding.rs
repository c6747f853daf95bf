use anyhow::Context;
use tracing::{debug, info};
use visionport_core::{
    Backend, BackendCapabilities, BackendError, BackendModel, ModelArtifact, ModelSpec,
    PredictionOptions, Tensor,
};

/// Object-safe view of a loaded [`BackendModel`].
pub trait BackendModelAdapter: Send {
    fn spec(&self) -> &ModelSpec;
    fn infer(&mut self, inputs: Vec<Tensor>) -> anyhow::Result<Vec<Tensor>>;
    fn reset(&mut self) -> anyhow::Result<()>;
}

impl<T: BackendModel> BackendModelAdapter for T {
    fn spec(&self) -> &ModelSpec {
        BackendModel::spec(self)
    }

    fn infer(&mut self, inputs: Vec<Tensor>) -> anyhow::Result<Vec<Tensor>> {
        BackendModel::infer(self, inputs)
    }

    fn reset(&mut self) -> anyhow::Result<()> {
        BackendModel::reset(self)
    }
}

/// Object-safe view of a [`Backend`], so predictors can hold `Arc<dyn BackendLoader>`.
pub trait BackendLoader: Send + Sync {
    fn backend_name(&self) -> &'static str;
    fn backend_capabilities(&self) -> BackendCapabilities;
    fn load_model(
        &self,
        artifact: &ModelArtifact,
        options: &PredictionOptions,
    ) -> anyhow::Result<Box<dyn BackendModelAdapter>>;
}

impl<B: Backend> BackendLoader for B {
    fn backend_name(&self) -> &'static str {
        Backend::name(self)
    }

    fn backend_capabilities(&self) -> BackendCapabilities {
        Backend::capabilities(self)
    }

    fn load_model(
        &self,
        artifact: &ModelArtifact,
        options: &PredictionOptions,
    ) -> anyhow::Result<Box<dyn BackendModelAdapter>> {
        let model = Backend::load(self, artifact, options)?;
        Ok(Box::new(model))
    }
}

/// Owns the runtime handle between load and release.
pub struct BackendBinding {
    backend: &'static str,
    capabilities: BackendCapabilities,
    model: Option<Box<dyn BackendModelAdapter>>,
}

impl BackendBinding {
    pub fn load(
        loader: &dyn BackendLoader,
        artifact: &ModelArtifact,
        options: &PredictionOptions,
    ) -> Result<Self, BackendError> {
        let backend = loader.backend_name();
        let model = loader
            .load_model(artifact, options)
            .map_err(|source| BackendError::LoadFailed {
                backend: backend.to_string(),
                graph: artifact.path().to_path_buf(),
                source,
            })?;

        let spec = model.spec();
        info!(
            backend,
            device = %options.device,
            inputs = spec.inputs.len(),
            outputs = spec.outputs.len(),
            "backend model loaded"
        );

        Ok(Self {
            backend,
            capabilities: loader.backend_capabilities(),
            model: Some(model),
        })
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend
    }

    pub fn is_live(&self) -> bool {
        self.model.is_some()
    }

    pub fn spec(&self) -> Result<&ModelSpec, BackendError> {
        self.model
            .as_deref()
            .map(|m| m.spec())
            .ok_or(BackendError::UseAfterClose)
    }

    /// Runs one already-batched input list.
    pub fn infer(&mut self, inputs: Vec<Tensor>) -> Result<Vec<Tensor>, BackendError> {
        let model = self.model.as_mut().ok_or(BackendError::UseAfterClose)?;
        model
            .infer(inputs)
            .map_err(|source| BackendError::InferFailed {
                backend: self.backend.to_string(),
                source,
            })
    }

    pub fn reset(&mut self) -> Result<(), BackendError> {
        let model = self.model.as_mut().ok_or(BackendError::UseAfterClose)?;
        if !self.capabilities.stateful_sessions {
            return Ok(());
        }
        model
            .reset()
            .context("session reset failed")
            .map_err(|source| BackendError::InferFailed {
                backend: self.backend.to_string(),
                source,
            })
    }

    /// Drops the runtime handle. Returns whether a handle was still held.
    pub fn release(&mut self) -> bool {
        let released = self.model.take().is_some();
        if released {
            debug!(backend = self.backend, "backend model released");
        }
        released
    }
}
