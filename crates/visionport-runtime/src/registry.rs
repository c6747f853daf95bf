use std::collections::HashMap;
use std::sync::Arc;

use visionport_core::{
    DescriptorError, Fetcher, Modality, ModelDescriptor, PredictionOptions, Result,
};

use crate::binding::BackendLoader;
use crate::Predictor;

/// Collaborators handed to every predictor constructor.
#[derive(Clone)]
pub struct PredictorContext {
    pub backend: Arc<dyn BackendLoader>,
    pub fetcher: Arc<dyn Fetcher>,
    pub options: PredictionOptions,
}

pub type PredictorConstructor = fn(ModelDescriptor, PredictorContext) -> Result<Predictor>;

pub fn enhancement_predictor(
    descriptor: ModelDescriptor,
    ctx: PredictorContext,
) -> Result<Predictor> {
    build(Modality::ImageEnhancement, descriptor, ctx)
}

pub fn semantic_segmentation_predictor(
    descriptor: ModelDescriptor,
    ctx: PredictorContext,
) -> Result<Predictor> {
    build(Modality::SemanticSegmentation, descriptor, ctx)
}

pub fn object_detection_predictor(
    descriptor: ModelDescriptor,
    ctx: PredictorContext,
) -> Result<Predictor> {
    build(Modality::ObjectDetection, descriptor, ctx)
}

pub fn instance_segmentation_predictor(
    descriptor: ModelDescriptor,
    ctx: PredictorContext,
) -> Result<Predictor> {
    build(Modality::InstanceSegmentation, descriptor, ctx)
}

fn build(
    modality: Modality,
    descriptor: ModelDescriptor,
    ctx: PredictorContext,
) -> Result<Predictor> {
    Predictor::new(modality, descriptor, ctx.options, ctx.backend, ctx.fetcher)
}

/// Predictor constructors keyed by modality.
///
/// The hosting process builds one at startup; nothing registers itself.
#[derive(Default)]
pub struct PredictorRegistry {
    constructors: HashMap<Modality, PredictorConstructor>,
}

impl PredictorRegistry {
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut reg = Self::new();
        reg.register(Modality::ImageEnhancement, enhancement_predictor);
        reg.register(Modality::SemanticSegmentation, semantic_segmentation_predictor);
        reg.register(Modality::ObjectDetection, object_detection_predictor);
        reg.register(Modality::InstanceSegmentation, instance_segmentation_predictor);
        reg
    }

    /// Returns the constructor previously registered for `modality`, if any.
    pub fn register(
        &mut self,
        modality: Modality,
        constructor: PredictorConstructor,
    ) -> Option<PredictorConstructor> {
        self.constructors.insert(modality, constructor)
    }

    pub fn get(&self, modality: Modality) -> Option<PredictorConstructor> {
        self.constructors.get(&modality).copied()
    }

    pub fn modalities(&self) -> Vec<Modality> {
        let mut modalities: Vec<_> = self.constructors.keys().copied().collect();
        modalities.sort();
        modalities
    }

    pub fn create(&self, descriptor: ModelDescriptor, ctx: PredictorContext) -> Result<Predictor> {
        let constructor = self
            .get(descriptor.modality)
            .ok_or(DescriptorError::Unregistered(descriptor.modality))?;
        constructor(descriptor, ctx)
    }
}
