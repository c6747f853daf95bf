use std::fmt;
use std::str::FromStr;

use bytes::{BufMut, Bytes, BytesMut};
use smallvec::SmallVec;

use crate::ShapeError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Device {
    #[default]
    Cpu,
    Cuda { device_id: u32 },
}

impl FromStr for Device {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw.eq_ignore_ascii_case("cpu") {
            return Ok(Device::Cpu);
        }

        if let Some(rest) = raw.strip_prefix("cuda:") {
            let device_id = rest
                .parse()
                .map_err(|_| format!("invalid cuda device id: {rest}"))?;
            return Ok(Device::Cuda { device_id });
        }

        Err(format!("unsupported device: {raw} (expected cpu or cuda:N)"))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Cuda { device_id } => write!(f, "cuda:{device_id}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DType {
    F32,
    F16,
    I64,
    I32,
    U8,
}

impl DType {
    pub fn size(self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F16 => 2,
            DType::I64 => 8,
            DType::I32 => 4,
            DType::U8 => 1,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::F32 => "f32",
            DType::F16 => "f16",
            DType::I64 => "i64",
            DType::I32 => "i32",
            DType::U8 => "u8",
        };
        f.write_str(name)
    }
}

/// Row-major dimensions, outermost first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Shape(pub SmallVec<[usize; 6]>);

impl Shape {
    pub fn from_slice(d: &[usize]) -> Self {
        Self(d.iter().copied().collect())
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Element count, or `None` when the product does not fit in `usize`.
    pub fn numel(&self) -> Option<usize> {
        if self.0.contains(&0) {
            return Some(0);
        }
        self.0.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Returns `[lead] + self`.
    pub fn with_leading(&self, lead: usize) -> Self {
        let mut dims = SmallVec::with_capacity(self.rank() + 1);
        dims.push(lead);
        dims.extend_from_slice(&self.0);
        Self(dims)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0.as_slice())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TensorDesc {
    pub dtype: DType,
    pub shape: Shape,
}

/// Dense CPU tensor stored as little-endian bytes.
#[derive(Clone, Debug)]
pub struct Tensor {
    pub desc: TensorDesc,
    pub data: Bytes,
}

impl Tensor {
    pub fn from_bytes(dtype: DType, shape: Shape, data: Bytes) -> Self {
        Self {
            desc: TensorDesc { dtype, shape },
            data,
        }
    }

    pub fn from_f32(shape: Shape, values: &[f32]) -> Result<Self, ShapeError> {
        let tensor = Self::from_bytes(DType::F32, shape, bytes_from_f32(values));
        tensor.validate()?;
        Ok(tensor)
    }

    pub fn dtype(&self) -> DType {
        self.desc.dtype
    }

    pub fn shape(&self) -> &Shape {
        &self.desc.shape
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Checks that the buffer holds exactly `numel * dtype.size()` bytes.
    pub fn validate(&self) -> Result<(), ShapeError> {
        let expected = self
            .desc
            .shape
            .numel()
            .and_then(|n| n.checked_mul(self.desc.dtype.size()))
            .ok_or_else(|| ShapeError::Overflow {
                shape: self.desc.shape.clone(),
                dtype: self.desc.dtype,
            })?;
        if self.data.len() != expected {
            return Err(ShapeError::LengthMismatch {
                shape: self.desc.shape.clone(),
                dtype: self.desc.dtype,
                expected,
                got: self.data.len(),
            });
        }
        Ok(())
    }

    pub fn to_f32_vec(&self) -> Result<Vec<f32>, ShapeError> {
        if self.desc.dtype != DType::F32 {
            return Err(ShapeError::UnsupportedType(self.desc.dtype));
        }
        self.validate()?;
        Ok(self
            .data
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }
}

pub fn bytes_from_f32(values: &[f32]) -> Bytes {
    let mut buf = BytesMut::with_capacity(std::mem::size_of_val(values));
    for v in values {
        buf.put_f32_le(*v);
    }
    buf.freeze()
}
