use std::path::{Path, PathBuf};

/// A graph file on local disk, tagged with the format the backend must expect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelArtifact {
    OnnxPath(PathBuf),
    TorchScriptPath(PathBuf),
}

impl ModelArtifact {
    /// Picks the format from the file extension; anything unknown is treated as ONNX.
    pub fn from_graph_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("pt") | Some("pth") | Some("torchscript") => ModelArtifact::TorchScriptPath(path),
            _ => ModelArtifact::OnnxPath(path),
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            ModelArtifact::OnnxPath(p) | ModelArtifact::TorchScriptPath(p) => p,
        }
    }
}
