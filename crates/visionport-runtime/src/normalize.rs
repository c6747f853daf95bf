use bytes::BytesMut;
use tracing::debug;
use visionport_core::{DType, ShapeError, Tensor};

/// Stacks single-sample tensors into one batch along a new leading axis.
///
/// Every sample must be f32 and share the first sample's shape. Buffers are
/// concatenated in input order; nothing is resampled, padded or converted.
pub fn normalize(samples: &[Tensor]) -> Result<Tensor, ShapeError> {
    let first = samples.first().ok_or(ShapeError::Empty)?;
    let sample_shape = first.shape();

    for (index, sample) in samples.iter().enumerate() {
        if sample.dtype() != DType::F32 {
            return Err(ShapeError::UnsupportedType(sample.dtype()));
        }
        if sample.shape() != sample_shape {
            return Err(ShapeError::InconsistentShape {
                index,
                expected: sample_shape.clone(),
                got: sample.shape().clone(),
            });
        }
        sample.validate()?;
    }

    let shape = sample_shape.with_leading(samples.len());
    let total = first
        .byte_len()
        .checked_mul(samples.len())
        .ok_or_else(|| ShapeError::Overflow {
            shape: shape.clone(),
            dtype: DType::F32,
        })?;

    let mut data = BytesMut::with_capacity(total);
    for sample in samples {
        data.extend_from_slice(&sample.data);
    }

    debug!(batch = samples.len(), shape = %shape, "stacked input batch");
    Ok(Tensor::from_bytes(DType::F32, shape, data.freeze()))
}
