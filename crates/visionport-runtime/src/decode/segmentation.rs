use std::sync::Arc;

use serde::Serialize;
use tracing::warn;
use visionport_core::{DecodeError, Tensor};

use super::shape_mismatch;

/// Class ids indexed `[batch][row][col]`, with the label table they index into.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SegmentationMasks {
    pub masks: Vec<Vec<Vec<i64>>>,
    pub labels: Arc<[String]>,
}

impl SegmentationMasks {
    pub fn label_at(&self, b: usize, h: usize, w: usize) -> Option<&str> {
        let class = *self.masks.get(b)?.get(h)?.get(w)?;
        let class = usize::try_from(class).ok()?;
        self.labels.get(class).map(String::as_str)
    }
}

/// Per-pixel arg-max over the class axis of a `[batch, classes, height, width]` output.
///
/// Ties keep the lowest class index: the scan runs from class 0 upward and
/// only a strictly greater score replaces the current best.
pub fn decode_segmentation(
    output: &Tensor,
    labels: Arc<[String]>,
) -> Result<SegmentationMasks, DecodeError> {
    const EXPECTED: &str = "[batch, classes, height, width]";

    let &[batch, classes, height, width] = output.shape().dims() else {
        return Err(shape_mismatch("class_scores", EXPECTED, output));
    };
    if classes == 0 {
        return Err(shape_mismatch("class_scores", EXPECTED, output));
    }
    if labels.len() < classes {
        warn!(
            classes,
            labels = labels.len(),
            "label table is shorter than the class axis"
        );
    }

    let data = output.to_f32_vec()?;
    let plane = height * width;

    let mut masks = Vec::with_capacity(batch);
    for b in 0..batch {
        let base = b * classes * plane;
        let mut rows = Vec::with_capacity(height);
        for h in 0..height {
            let mut row = Vec::with_capacity(width);
            for w in 0..width {
                let px = base + h * width + w;
                let mut best = 0;
                let mut best_score = data[px];
                for c in 1..classes {
                    let score = data[px + c * plane];
                    if score > best_score {
                        best = c;
                        best_score = score;
                    }
                }
                row.push(best as i64);
            }
            rows.push(row);
        }
        masks.push(rows);
    }

    Ok(SegmentationMasks { masks, labels })
}
