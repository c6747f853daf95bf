use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use visionport_core::{Shape, Tensor};

/// One sample on disk: row-major f32 values plus their shape.
#[derive(Deserialize)]
struct TensorFile {
    shape: Vec<usize>,
    data: Vec<f32>,
}

pub fn read_tensor(path: &Path) -> Result<Tensor> {
    let raw = std::fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
    let file: TensorFile = serde_json::from_slice(&raw)
        .with_context(|| format!("{} is not a tensor file", path.display()))?;
    Tensor::from_f32(Shape::from_slice(&file.shape), &file.data)
        .with_context(|| format!("{} has inconsistent shape and data", path.display()))
}
