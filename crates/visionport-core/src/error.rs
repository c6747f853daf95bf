//! Error taxonomy shared by every visionport component.
//!
//! Each component has its own enum; [`PredictorError`] gathers them for the
//! predictor surface so callers can match on the failing stage.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::{DType, Modality, Shape};

/// Bad caller input. Never retried.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("input data is empty")]
    NilInput,
    #[error("input tensor {index} has element type {got}, expected {expected}")]
    WrongTensorType {
        index: usize,
        expected: DType,
        got: DType,
    },
    #[error("unsupported input spec: {0}")]
    UnsupportedInputSpec(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShapeError {
    #[error("cannot batch an empty sample list")]
    Empty,
    #[error("sample {index} has shape {got}, expected {expected}")]
    InconsistentShape {
        index: usize,
        expected: Shape,
        got: Shape,
    },
    #[error("unsupported tensor element type {0}")]
    UnsupportedType(DType),
    #[error("{dtype} shape {shape} is too large to address")]
    Overflow { shape: Shape, dtype: DType },
    #[error("buffer of {got} bytes does not match {dtype} shape {shape} ({expected} bytes)")]
    LengthMismatch {
        shape: Shape,
        dtype: DType,
        expected: usize,
        got: usize,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("output `{output}` has shape {got}, expected {expected}")]
    ShapeMismatch {
        output: &'static str,
        expected: String,
        got: Shape,
    },
    #[error("missing output tensor `{0}`")]
    MissingOutput(&'static str),
    #[error(transparent)]
    Tensor(#[from] ShapeError),
}

/// Failures of the inference runtime, tagged with the stage that failed.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{backend} failed to load {}", graph.display())]
    LoadFailed {
        backend: String,
        graph: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error("{backend} inference failed")]
    InferFailed {
        backend: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("backend handle used after release")]
    UseAfterClose,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("predictor is not loaded")]
    NotLoaded,
    #[error("no prediction output available, call predict first")]
    NoOutputAvailable,
    #[error("predictor is closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to fetch {url}")]
    Download {
        url: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("checksum mismatch for {}: expected {expected}, got {actual}", path.display())]
    Integrity {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    #[error("fetch timed out after {after:?}")]
    TimedOut { after: Duration },
}

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("cannot read manifest {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid manifest")]
    Parse(#[from] toml::de::Error),
    #[error("`{field}` is relative and the manifest has no base_url")]
    MissingBaseUrl { field: &'static str },
    #[error("{0} models need a features_path")]
    MissingFeatures(Modality),
    #[error("manifest declares modality {declared}, predictor serves {expected}")]
    ModalityMismatch {
        declared: Modality,
        expected: Modality,
    },
    #[error("no predictor registered for modality {0}")]
    Unregistered(Modality),
}

#[derive(Debug, Error)]
pub enum PredictorError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error("download of {resource} failed")]
    Download {
        resource: String,
        #[source]
        source: FetchError,
    },
    #[error("integrity check of {resource} failed")]
    Integrity {
        resource: String,
        #[source]
        source: FetchError,
    },
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Shape(#[from] ShapeError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("cannot read labels from {}", path.display())]
    Labels {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PredictorError {
    /// Splits checksum failures from transport failures.
    pub fn from_fetch(resource: impl Into<String>, err: FetchError) -> Self {
        let resource = resource.into();
        match err {
            FetchError::Integrity { .. } => PredictorError::Integrity {
                resource,
                source: err,
            },
            _ => PredictorError::Download {
                resource,
                source: err,
            },
        }
    }
}

pub type Result<T, E = PredictorError> = std::result::Result<T, E>;
