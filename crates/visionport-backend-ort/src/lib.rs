//! ONNX Runtime backend.
//!
//! Vision graphs take a single f32 image batch and produce f32 outputs.
//! Both are checked when the session is created, so a graph that can never
//! be decoded is refused at load time instead of on the first predict.

use anyhow::{anyhow, bail, ensure, Context, Result};
use ort::{
    session::{
        builder::{GraphOptimizationLevel, SessionBuilder},
        Session, SessionInputValue,
    },
    tensor::TensorElementType,
    value::{ValueRef, ValueType},
};
use tracing::debug;
use visionport_core::{
    Backend, BackendCapabilities, BackendModel, DType, Device, IOName, ModelArtifact, ModelSpec,
    PredictionOptions, Shape, Tensor, TensorSpec,
};

/// Backend knob: number of intra-op threads.
pub const INTRA_THREADS: &str = "intra_threads";

#[derive(Clone, Copy, Debug, Default)]
pub struct OrtBackend;

impl OrtBackend {
    pub fn new() -> Self {
        Self
    }
}

pub struct OrtModel {
    spec: ModelSpec,
    session: Session,
    image_input: String,
}

impl Backend for OrtBackend {
    type Model = OrtModel;

    fn name(&self) -> &'static str {
        "onnxruntime"
    }

    fn load(&self, artifact: &ModelArtifact, options: &PredictionOptions) -> Result<OrtModel> {
        let ModelArtifact::OnnxPath(path) = artifact else {
            bail!("onnxruntime backend expects an ONNX graph, got {artifact:?}");
        };
        ensure!(path.is_file(), "graph file {} does not exist", path.display());

        let builder = Session::builder()
            .context("failed to create ORT session builder")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("failed to set ORT optimization level")?;
        let session = session_options(builder, options)?
            .commit_from_file(path)
            .with_context(|| format!("failed to load ONNX graph {}", path.display()))?;

        let spec = describe(&session)?;
        check_image_model(&spec)
            .with_context(|| format!("{} is not a vision graph", path.display()))?;
        let image_input = spec.inputs[0].name.0.clone();

        debug!(
            path = %path.display(),
            input = %image_input,
            outputs = spec.outputs.len(),
            "ONNX session created"
        );
        Ok(OrtModel {
            spec,
            session,
            image_input,
        })
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            supports_dynamic_shapes: true,
            stateful_sessions: false,
        }
    }
}

impl BackendModel for OrtModel {
    fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    fn infer(&mut self, inputs: Vec<Tensor>) -> Result<Vec<Tensor>> {
        let [batch] = <[Tensor; 1]>::try_from(inputs).map_err(|inputs| {
            anyhow!("expected one image batch, got {} inputs", inputs.len())
        })?;
        ensure!(
            batch.dtype() == DType::F32,
            "image batch must be f32, got {}",
            batch.dtype()
        );

        let dims = batch.shape().dims().to_vec();
        let values = batch.to_f32_vec().context("malformed image batch")?;
        let value = ort::value::Tensor::from_array((dims, values))?.into_dyn();
        let feed = vec![(self.image_input.clone(), SessionInputValue::from(value))];

        let outputs = self.session.run(feed)?;
        outputs
            .iter()
            .map(|(name, value)| output_tensor(name, &value))
            .collect()
    }
}

/// Checks that a graph takes one f32 image batch of rank 4 and only emits
/// f32 tensors.
pub fn check_image_model(spec: &ModelSpec) -> Result<()> {
    let [input] = spec.inputs.as_slice() else {
        bail!("expected a single image input, graph has {}", spec.inputs.len());
    };
    ensure!(
        input.dtype == DType::F32,
        "image input `{}` is {}, expected f32",
        input.name.0,
        input.dtype
    );
    ensure!(
        input.rank == 4,
        "image input `{}` has rank {}, expected [batch, channels, height, width]",
        input.name.0,
        input.rank
    );

    ensure!(!spec.outputs.is_empty(), "graph has no outputs");
    if let Some(output) = spec.outputs.iter().find(|o| o.dtype != DType::F32) {
        bail!(
            "output `{}` is {}, only f32 outputs can be decoded",
            output.name.0,
            output.dtype
        );
    }
    Ok(())
}

fn describe(session: &Session) -> Result<ModelSpec> {
    let inputs = session
        .inputs
        .iter()
        .map(|input| io_spec(&input.name, &input.input_type))
        .collect::<Result<Vec<_>>>()?;
    let outputs = session
        .outputs
        .iter()
        .map(|output| io_spec(&output.name, &output.output_type))
        .collect::<Result<Vec<_>>>()?;
    Ok(ModelSpec { inputs, outputs })
}

fn io_spec(name: &str, value_type: &ValueType) -> Result<TensorSpec> {
    let ValueType::Tensor { ty, shape, .. } = value_type else {
        bail!("`{name}` is not a tensor");
    };
    let dtype = match ty {
        TensorElementType::Float32 => DType::F32,
        TensorElementType::Float16 => DType::F16,
        TensorElementType::Int64 => DType::I64,
        TensorElementType::Int32 => DType::I32,
        TensorElementType::Uint8 => DType::U8,
        other => bail!("`{name}` has unsupported element type {other}"),
    };
    Ok(TensorSpec {
        name: IOName(name.to_string()),
        dtype,
        rank: shape.len(),
        dims: shape.iter().map(|&d| usize::try_from(d).ok()).collect(),
    })
}

fn session_options(
    builder: SessionBuilder,
    options: &PredictionOptions,
) -> Result<SessionBuilder> {
    let builder = match options.backend_option(INTRA_THREADS) {
        Some(raw) => {
            let threads: usize = raw
                .parse()
                .with_context(|| format!("invalid {INTRA_THREADS} value: {raw}"))?;
            builder
                .with_intra_threads(threads)
                .context("failed to set ORT intra-op threads")?
        }
        None => builder,
    };

    match options.device {
        Device::Cpu => Ok(builder),
        Device::Cuda { device_id } => with_cuda(builder, device_id),
    }
}

#[cfg(feature = "cuda")]
fn with_cuda(builder: SessionBuilder, device_id: u32) -> Result<SessionBuilder> {
    use ort::execution_providers::cuda::CUDAExecutionProvider;

    let device_id = i32::try_from(device_id).context("cuda device id out of range")?;
    let provider = CUDAExecutionProvider::default()
        .with_device_id(device_id)
        .build();
    builder
        .with_execution_providers([provider])
        .context("failed to enable ORT CUDA execution provider")
}

#[cfg(not(feature = "cuda"))]
fn with_cuda(_builder: SessionBuilder, device_id: u32) -> Result<SessionBuilder> {
    bail!("cuda:{device_id} requested but the `cuda` feature is disabled")
}

fn output_tensor(name: &str, value: &ValueRef<'_>) -> Result<Tensor> {
    let ValueType::Tensor { ty, shape, .. } = value.dtype() else {
        bail!("output `{name}` is not a tensor");
    };
    ensure!(
        *ty == TensorElementType::Float32,
        "output `{name}` is {ty}, only f32 outputs can be decoded"
    );

    let dims = shape
        .iter()
        .map(|&d| usize::try_from(d))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("output `{name}` has a negative dimension"))?;
    let array = value.try_extract_array::<f32>()?;
    let values = array
        .as_slice()
        .with_context(|| format!("output `{name}` is not contiguous"))?;
    Tensor::from_f32(Shape::from_slice(&dims), values)
        .with_context(|| format!("output `{name}` does not match its shape"))
}
