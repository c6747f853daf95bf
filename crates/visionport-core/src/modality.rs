use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The task a vision model performs. Fixed per predictor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    ImageEnhancement,
    SemanticSegmentation,
    ObjectDetection,
    InstanceSegmentation,
}

impl Modality {
    pub const ALL: [Modality; 4] = [
        Modality::ImageEnhancement,
        Modality::SemanticSegmentation,
        Modality::ObjectDetection,
        Modality::InstanceSegmentation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Modality::ImageEnhancement => "image_enhancement",
            Modality::SemanticSegmentation => "semantic_segmentation",
            Modality::ObjectDetection => "object_detection",
            Modality::InstanceSegmentation => "instance_segmentation",
        }
    }

    /// Whether the model ships a label file next to its graph.
    pub fn needs_features(self) -> bool {
        !matches!(self, Modality::ImageEnhancement)
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Modality {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Modality::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(raw))
            .ok_or_else(|| format!("unknown modality: {raw}"))
    }
}
