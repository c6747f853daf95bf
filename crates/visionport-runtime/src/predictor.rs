//! Predictor lifecycle: download, load, predict, read features, reset, close.
//!
//! ```text
//! Uninitialized --download--> Downloaded --load--> Loaded --predict--> Ready
//!       |                                            ^                   |
//!       +------------------load----------------------+<------reset-------+
//! any state --close--> Closed
//! ```
//!
//! A predictor is not meant to be shared: `predict` stores the raw outputs
//! that `read_predicted_features` decodes, so calls on one instance must be
//! serialized. Run one predictor per worker for parallelism.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use visionport_core::{
    BackendError, DType, DescriptorError, FetchError, Fetcher, IOName, Modality, ModelArtifact,
    ModelDescriptor, PredictionOptions, PredictorError, Result, StateError, Tensor,
    ValidationError,
};

use crate::artifact::{ArtifactResolver, ResolvedArtifacts};
use crate::binding::{BackendBinding, BackendLoader};
use crate::decode::{Decoder, Features};
use crate::labels::read_labels;
use crate::normalize::normalize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PredictorState {
    Uninitialized,
    Downloaded,
    Loaded,
    /// Loaded and at least one predict call has succeeded.
    Ready,
    Closed,
}

impl fmt::Display for PredictorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PredictorState::Uninitialized => "uninitialized",
            PredictorState::Downloaded => "downloaded",
            PredictorState::Loaded => "loaded",
            PredictorState::Ready => "ready",
            PredictorState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Raw outputs of the last predict call, paired with their names.
#[derive(Clone, Debug)]
pub struct RawPrediction {
    pub outputs: Vec<(IOName, Tensor)>,
    pub labels: Arc<[String]>,
}

pub struct Predictor {
    modality: Modality,
    decoder: Decoder,
    descriptor: ModelDescriptor,
    options: PredictionOptions,
    backend: Arc<dyn BackendLoader>,
    resolver: ArtifactResolver,
    state: PredictorState,
    artifacts: Option<ResolvedArtifacts>,
    binding: Option<BackendBinding>,
    labels: Arc<[String]>,
    last_outputs: Option<Vec<Tensor>>,
}

impl Predictor {
    /// Validates the descriptor up front; no I/O happens here.
    pub fn new(
        modality: Modality,
        descriptor: ModelDescriptor,
        options: PredictionOptions,
        backend: Arc<dyn BackendLoader>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self> {
        descriptor.validate_inputs()?;
        if descriptor.modality != modality {
            return Err(DescriptorError::ModalityMismatch {
                declared: descriptor.modality,
                expected: modality,
            }
            .into());
        }
        if modality.needs_features() && descriptor.model.features_path.is_none() {
            return Err(DescriptorError::MissingFeatures(modality).into());
        }

        Ok(Self {
            modality,
            decoder: Decoder::for_modality(modality),
            descriptor,
            options,
            backend,
            resolver: ArtifactResolver::new(fetcher),
            state: PredictorState::Uninitialized,
            artifacts: None,
            binding: None,
            labels: Arc::from(Vec::new()),
            last_outputs: None,
        })
    }

    pub fn modality(&self) -> Modality {
        self.modality
    }

    pub fn state(&self) -> PredictorState {
        self.state
    }

    pub fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    pub fn options(&self) -> &PredictionOptions {
        &self.options
    }

    pub fn artifacts(&self) -> Option<&ResolvedArtifacts> {
        self.artifacts.as_ref()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Fetches artifacts without touching the backend. Safe to call again.
    pub async fn download(&mut self) -> Result<()> {
        self.ensure_artifacts().await.map(drop)
    }

    /// Downloads if needed, binds the backend and reads the label file.
    #[instrument(
        skip(self),
        fields(model = %self.descriptor.canonical_name(), modality = %self.modality)
    )]
    pub async fn load(&mut self) -> Result<()> {
        match self.state {
            PredictorState::Closed => return Err(StateError::Closed.into()),
            PredictorState::Loaded | PredictorState::Ready => return Ok(()),
            PredictorState::Uninitialized | PredictorState::Downloaded => {}
        }

        let artifacts = self.ensure_artifacts().await?;

        let labels = match &artifacts.features_path {
            Some(path) => read_labels(path)
                .await
                .map_err(|source| PredictorError::Labels {
                    path: path.clone(),
                    source,
                })?,
            None => Vec::new(),
        };
        debug!(labels = labels.len(), "labels read");

        let artifact = ModelArtifact::from_graph_path(&artifacts.graph_path);
        let binding = BackendBinding::load(self.backend.as_ref(), &artifact, &self.options)?;

        self.labels = labels.into();
        self.binding = Some(binding);
        self.state = PredictorState::Loaded;
        info!(backend = self.backend.backend_name(), "predictor loaded");
        Ok(())
    }

    /// Batches `inputs` (one tensor per sample) and runs inference.
    pub fn predict(&mut self, inputs: &[Tensor]) -> Result<()> {
        if inputs.is_empty() {
            return Err(ValidationError::NilInput.into());
        }
        if let Some((index, tensor)) = inputs
            .iter()
            .enumerate()
            .find(|(_, t)| t.dtype() != DType::F32)
        {
            return Err(ValidationError::WrongTensorType {
                index,
                expected: DType::F32,
                got: tensor.dtype(),
            }
            .into());
        }
        if inputs.len() > self.options.batch_size {
            warn!(
                batch = inputs.len(),
                batch_size = self.options.batch_size,
                "batch exceeds configured batch size"
            );
        }

        self.last_outputs = None;
        let binding = self.binding_mut()?;
        let batch = normalize(inputs)?;
        let outputs = binding.infer(vec![batch])?;
        debug!(outputs = outputs.len(), "inference finished");

        self.last_outputs = Some(outputs);
        self.state = PredictorState::Ready;
        Ok(())
    }

    /// Decodes the outputs of the last successful `predict`.
    pub fn read_predicted_features(&self) -> Result<Features> {
        let outputs = self.stored_outputs()?;
        Ok(self.decoder.decode(outputs, &self.labels)?)
    }

    /// Undecoded outputs of the last `predict`, named after the model's outputs.
    pub fn read_raw_outputs(&self) -> Result<RawPrediction> {
        let outputs = self.stored_outputs()?;
        let spec_names: Vec<IOName> = match &self.binding {
            Some(binding) => binding
                .spec()?
                .outputs
                .iter()
                .map(|s| s.name.clone())
                .collect(),
            None => Vec::new(),
        };

        let outputs = outputs
            .iter()
            .cloned()
            .enumerate()
            .map(|(i, t)| {
                let name = self
                    .descriptor
                    .outputs
                    .get(i)
                    .map(|n| IOName(n.clone()))
                    .or_else(|| spec_names.get(i).cloned())
                    .unwrap_or_else(|| IOName(format!("out{i}")));
                (name, t)
            })
            .collect();

        Ok(RawPrediction {
            outputs,
            labels: Arc::clone(&self.labels),
        })
    }

    /// Clears per-call state; backends with session state are reset too.
    pub fn reset(&mut self) -> Result<()> {
        self.binding_mut()?.reset()?;
        self.last_outputs = None;
        self.state = PredictorState::Loaded;
        Ok(())
    }

    /// Releases the backend handle. Idempotent and valid in every state.
    pub fn close(&mut self) {
        if self.state == PredictorState::Closed {
            return;
        }
        if let Some(mut binding) = self.binding.take() {
            binding.release();
        }
        self.last_outputs = None;
        self.state = PredictorState::Closed;
        info!(model = %self.descriptor.canonical_name(), "predictor closed");
    }

    async fn ensure_artifacts(&mut self) -> Result<ResolvedArtifacts> {
        if self.state == PredictorState::Closed {
            return Err(StateError::Closed.into());
        }
        if let Some(artifacts) = &self.artifacts {
            return Ok(artifacts.clone());
        }

        let resolve = self.resolver.resolve(&self.descriptor);
        let artifacts = match self.options.download_timeout {
            Some(after) => tokio::time::timeout(after, resolve).await.map_err(|_| {
                PredictorError::from_fetch(
                    self.descriptor.canonical_name(),
                    FetchError::TimedOut { after },
                )
            })??,
            None => resolve.await?,
        };

        info!(
            model = %self.descriptor.canonical_name(),
            graph = %artifacts.graph_path.display(),
            "artifacts ready"
        );
        self.artifacts = Some(artifacts.clone());
        if self.state == PredictorState::Uninitialized {
            self.state = PredictorState::Downloaded;
        }
        Ok(artifacts)
    }

    fn binding_mut(&mut self) -> Result<&mut BackendBinding> {
        match (self.state, self.binding.as_mut()) {
            (PredictorState::Closed, _) => Err(BackendError::UseAfterClose.into()),
            (_, Some(binding)) => Ok(binding),
            (_, None) => Err(StateError::NotLoaded.into()),
        }
    }

    fn stored_outputs(&self) -> Result<&[Tensor]> {
        match (self.state, &self.binding) {
            (PredictorState::Closed, _) => Err(StateError::Closed.into()),
            (_, None) => Err(StateError::NotLoaded.into()),
            (_, Some(_)) => self
                .last_outputs
                .as_deref()
                .ok_or_else(|| StateError::NoOutputAvailable.into()),
        }
    }
}

impl Drop for Predictor {
    fn drop(&mut self) {
        self.close();
    }
}
