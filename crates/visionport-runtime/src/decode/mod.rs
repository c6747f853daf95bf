//! Turns raw backend outputs into per-modality features.
//!
//! Every decoder walks a flat row-major f32 buffer using the tensor's shape.
//! Outputs whose rank or dimensions do not fit the modality are rejected,
//! never truncated or padded.

mod detection;
mod enhancement;
mod segmentation;

use std::sync::Arc;

use serde::Serialize;
use visionport_core::{DecodeError, Modality, Tensor};

pub use detection::{
    decode_detection, decode_instance_segmentation, BoundingBox, Detection, InstanceDetection,
};
pub use enhancement::{decode_enhancement, EnhancedImages};
pub use segmentation::{decode_segmentation, SegmentationMasks};

/// Decoded result of one predict call.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "modality", content = "features", rename_all = "snake_case")]
pub enum Features {
    ImageEnhancement(EnhancedImages),
    SemanticSegmentation(SegmentationMasks),
    ObjectDetection(Vec<Vec<Detection>>),
    InstanceSegmentation(Vec<Vec<InstanceDetection>>),
}

impl Features {
    pub fn modality(&self) -> Modality {
        match self {
            Features::ImageEnhancement(_) => Modality::ImageEnhancement,
            Features::SemanticSegmentation(_) => Modality::SemanticSegmentation,
            Features::ObjectDetection(_) => Modality::ObjectDetection,
            Features::InstanceSegmentation(_) => Modality::InstanceSegmentation,
        }
    }

    pub fn batch_len(&self) -> usize {
        match self {
            Features::ImageEnhancement(e) => e.images.len(),
            Features::SemanticSegmentation(s) => s.masks.len(),
            Features::ObjectDetection(d) => d.len(),
            Features::InstanceSegmentation(d) => d.len(),
        }
    }
}

/// Decoder variant, fixed when the predictor is built.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decoder {
    Enhancement,
    SemanticSegmentation,
    ObjectDetection,
    InstanceSegmentation,
}

impl Decoder {
    pub fn for_modality(modality: Modality) -> Self {
        match modality {
            Modality::ImageEnhancement => Decoder::Enhancement,
            Modality::SemanticSegmentation => Decoder::SemanticSegmentation,
            Modality::ObjectDetection => Decoder::ObjectDetection,
            Modality::InstanceSegmentation => Decoder::InstanceSegmentation,
        }
    }

    pub fn decode(
        &self,
        outputs: &[Tensor],
        labels: &Arc<[String]>,
    ) -> Result<Features, DecodeError> {
        match self {
            Decoder::Enhancement => {
                let output = output(outputs, 0, "enhanced")?;
                decode_enhancement(output).map(Features::ImageEnhancement)
            }
            Decoder::SemanticSegmentation => {
                let output = output(outputs, 0, "class_scores")?;
                decode_segmentation(output, Arc::clone(labels)).map(Features::SemanticSegmentation)
            }
            Decoder::ObjectDetection => {
                decode_detection(outputs, labels).map(Features::ObjectDetection)
            }
            Decoder::InstanceSegmentation => {
                decode_instance_segmentation(outputs, labels).map(Features::InstanceSegmentation)
            }
        }
    }
}

fn output<'a>(
    outputs: &'a [Tensor],
    index: usize,
    name: &'static str,
) -> Result<&'a Tensor, DecodeError> {
    outputs.get(index).ok_or(DecodeError::MissingOutput(name))
}

fn shape_mismatch(output: &'static str, expected: impl Into<String>, got: &Tensor) -> DecodeError {
    DecodeError::ShapeMismatch {
        output,
        expected: expected.into(),
        got: got.shape().clone(),
    }
}
