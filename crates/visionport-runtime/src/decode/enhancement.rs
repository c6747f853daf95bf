use serde::Serialize;
use visionport_core::{DecodeError, Tensor};

use super::shape_mismatch;

/// RGB pixels indexed `[batch][row][col][channel]`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EnhancedImages {
    pub images: Vec<Vec<Vec<[f32; 3]>>>,
}

/// Transposes a planar `[batch, 3, height, width]` output into interleaved pixels.
pub fn decode_enhancement(output: &Tensor) -> Result<EnhancedImages, DecodeError> {
    const EXPECTED: &str = "[batch, 3, height, width]";

    let &[batch, channels, height, width] = output.shape().dims() else {
        return Err(shape_mismatch("enhanced", EXPECTED, output));
    };
    if channels != 3 {
        return Err(shape_mismatch("enhanced", EXPECTED, output));
    }

    let data = output.to_f32_vec()?;
    let plane = height * width;

    // flat offset = b*C*H*W + c*H*W + h*W + w
    let images = (0..batch)
        .map(|b| {
            let base = b * channels * plane;
            (0..height)
                .map(|h| {
                    (0..width)
                        .map(|w| {
                            let px = base + h * width + w;
                            [data[px], data[px + plane], data[px + 2 * plane]]
                        })
                        .collect()
                })
                .collect()
        })
        .collect();

    Ok(EnhancedImages { images })
}
