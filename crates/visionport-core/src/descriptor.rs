use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{DescriptorError, Modality, ValidationError};

/// Caller supplied description of a model. The core only reads it.
///
/// ```toml
/// name = "deeplabv3_resnet101"
/// version = "1.0"
/// modality = "semantic_segmentation"
///
/// [[inputs]]
/// type = "image"
///
/// [model]
/// base_url = "https://models.example.com/deeplab/"
/// graph_path = "deeplabv3.onnx"
/// graph_checksum = "9f86d081..."
/// features_path = "voc_labels.txt"
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    pub modality: Modality,
    #[serde(default)]
    pub inputs: Vec<InputSpec>,
    pub model: ModelSource,
    /// Named output layers, in backend output order.
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InputSpec {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ModelSource {
    #[serde(default)]
    pub base_url: Option<String>,
    pub graph_path: String,
    #[serde(default)]
    pub graph_checksum: Option<String>,
    /// When set, `base_url` points at a tarball and `graph_path` is relative
    /// to the unpacked work directory.
    #[serde(default)]
    pub is_archive: bool,
    #[serde(default)]
    pub features_path: Option<String>,
    #[serde(default)]
    pub features_checksum: Option<String>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl ModelDescriptor {
    pub fn from_toml_str(raw: &str) -> Result<Self, DescriptorError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, DescriptorError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| DescriptorError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// `name:version`, the key used in logs.
    pub fn canonical_name(&self) -> String {
        format!("{}:{}", self.name, self.version)
    }

    /// Vision predictors take exactly one input and it must be an image.
    pub fn validate_inputs(&self) -> Result<&InputSpec, ValidationError> {
        let [input] = self.inputs.as_slice() else {
            return Err(ValidationError::UnsupportedInputSpec(format!(
                "expected exactly one input, got {}",
                self.inputs.len()
            )));
        };
        if !input.kind.eq_ignore_ascii_case("image") {
            return Err(ValidationError::UnsupportedInputSpec(format!(
                "input type `{}` is not supported",
                input.kind
            )));
        }
        Ok(input)
    }

    pub fn work_dir(&self) -> PathBuf {
        match &self.work_dir {
            Some(dir) => dir.clone(),
            None => std::env::temp_dir()
                .join("visionport")
                .join(&self.name)
                .join(&self.version),
        }
    }

    pub fn graph_url(&self) -> Result<String, DescriptorError> {
        resolve_url(self.model.base_url.as_deref(), &self.model.graph_path, "graph_path")
    }

    pub fn features_url(&self) -> Result<Option<String>, DescriptorError> {
        self.model
            .features_path
            .as_deref()
            .map(|p| resolve_url(self.model.base_url.as_deref(), p, "features_path"))
            .transpose()
    }

    /// Local destination of the graph file.
    pub fn graph_file(&self) -> Result<PathBuf, DescriptorError> {
        if self.model.is_archive {
            return Ok(self.work_dir().join(&self.model.graph_path));
        }
        Ok(self.work_dir().join(file_name(&self.graph_url()?)))
    }

    pub fn features_file(&self) -> Result<Option<PathBuf>, DescriptorError> {
        Ok(self
            .features_url()?
            .map(|url| self.work_dir().join(file_name(&url))))
    }
}

fn resolve_url(
    base: Option<&str>,
    path: &str,
    field: &'static str,
) -> Result<String, DescriptorError> {
    if path.contains("://") {
        return Ok(path.to_string());
    }
    match base {
        Some(base) => Ok(format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )),
        None if Path::new(path).is_absolute() => Ok(path.to_string()),
        None => Err(DescriptorError::MissingBaseUrl { field }),
    }
}

/// Last path segment of a URL, without query or fragment.
pub fn file_name(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    let path = &url[..end];
    path.rsplit('/').next().unwrap_or(path)
}
