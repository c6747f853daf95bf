use serde::Serialize;
use visionport_core::{DecodeError, Tensor};

use super::{output, shape_mismatch};

/// Normalized box corners.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BoundingBox {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub class_id: i64,
    /// Empty when the class id falls outside the label table.
    pub label: String,
    pub probability: f32,
    pub bbox: BoundingBox,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InstanceDetection {
    #[serde(flatten)]
    pub detection: Detection,
    /// Per-instance mask, `[mask_height][mask_width]`.
    pub mask: Vec<Vec<f32>>,
}

/// Decodes `boxes [B, N, 4]`, `scores [B, N]` and `classes [B, N]`.
///
/// Boxes are stored as `(ymin, xmin, ymax, xmax)` and class ids as floats.
/// Detections keep the order the model emitted them in.
pub fn decode_detection(
    outputs: &[Tensor],
    labels: &[String],
) -> Result<Vec<Vec<Detection>>, DecodeError> {
    let boxes = output(outputs, 0, "boxes")?;
    let scores = output(outputs, 1, "scores")?;
    let classes = output(outputs, 2, "classes")?;

    let &[batch, count, 4] = boxes.shape().dims() else {
        return Err(shape_mismatch("boxes", "[batch, detections, 4]", boxes));
    };
    let expected = format!("[{batch}, {count}]");
    if scores.shape().dims() != [batch, count] {
        return Err(shape_mismatch("scores", expected, scores));
    }
    if classes.shape().dims() != [batch, count] {
        return Err(shape_mismatch("classes", expected, classes));
    }

    let boxes = boxes.to_f32_vec()?;
    let scores = scores.to_f32_vec()?;
    let classes = classes.to_f32_vec()?;

    let detections = (0..batch)
        .map(|b| {
            (0..count)
                .map(|n| {
                    let i = b * count + n;
                    let corners = &boxes[i * 4..i * 4 + 4];
                    let class_id = classes[i].round() as i64;
                    Detection {
                        class_id,
                        label: label_for(labels, class_id),
                        probability: scores[i],
                        bbox: BoundingBox {
                            ymin: corners[0],
                            xmin: corners[1],
                            ymax: corners[2],
                            xmax: corners[3],
                        },
                    }
                })
                .collect()
        })
        .collect();

    Ok(detections)
}

/// Detection outputs followed by `masks [B, N, mask_height, mask_width]`.
pub fn decode_instance_segmentation(
    outputs: &[Tensor],
    labels: &[String],
) -> Result<Vec<Vec<InstanceDetection>>, DecodeError> {
    let masks = output(outputs, 3, "masks")?;
    let detections = decode_detection(&outputs[..3], labels)?;

    let batch = detections.len();
    let count = outputs[0].shape().dims()[1];
    let &[mb, mn, mask_height, mask_width] = masks.shape().dims() else {
        return Err(shape_mismatch(
            "masks",
            format!("[{batch}, {count}, mask_height, mask_width]"),
            masks,
        ));
    };
    if mb != batch || mn != count {
        return Err(shape_mismatch(
            "masks",
            format!("[{batch}, {count}, mask_height, mask_width]"),
            masks,
        ));
    }

    let data = masks.to_f32_vec()?;
    let plane = mask_height * mask_width;

    let instances = detections
        .into_iter()
        .enumerate()
        .map(|(b, items)| {
            items
                .into_iter()
                .enumerate()
                .map(|(n, detection)| {
                    let base = (b * count + n) * plane;
                    let mask = data[base..base + plane]
                        .chunks_exact(mask_width.max(1))
                        .take(mask_height)
                        .map(<[f32]>::to_vec)
                        .collect();
                    InstanceDetection { detection, mask }
                })
                .collect()
        })
        .collect();

    Ok(instances)
}

fn label_for(labels: &[String], class_id: i64) -> String {
    usize::try_from(class_id)
        .ok()
        .and_then(|i| labels.get(i))
        .cloned()
        .unwrap_or_default()
}
