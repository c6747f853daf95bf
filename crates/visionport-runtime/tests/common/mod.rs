#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::bail;
use async_trait::async_trait;
use tempfile::TempDir;
use visionport_core::{
    Backend, BackendCapabilities, BackendModel, FetchError, FetchOutcome, Fetcher, Modality,
    ModelArtifact, ModelDescriptor, ModelSpec, PredictionOptions, Shape, Tensor,
};
use visionport_runtime::{sha256_file, LocalFetcher, PredictorContext};

/// What a mock model returns from `infer`.
#[derive(Clone)]
pub enum Script {
    /// Returns the batched input unchanged.
    Echo,
    /// Returns these outputs regardless of input.
    Fixed(Vec<Tensor>),
    Fail,
}

#[derive(Clone)]
pub struct MockBackend {
    pub loads: Arc<AtomicUsize>,
    pub resets: Arc<AtomicUsize>,
    pub seen: Arc<Mutex<Vec<Shape>>>,
    pub script: Script,
    pub stateful: bool,
}

impl MockBackend {
    pub fn new(script: Script) -> Self {
        Self {
            loads: Arc::new(AtomicUsize::new(0)),
            resets: Arc::new(AtomicUsize::new(0)),
            seen: Arc::new(Mutex::new(Vec::new())),
            script,
            stateful: false,
        }
    }

    pub fn stateful(mut self) -> Self {
        self.stateful = true;
        self
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

pub struct MockModel {
    spec: ModelSpec,
    backend: MockBackend,
}

impl Backend for MockBackend {
    type Model = MockModel;

    fn name(&self) -> &'static str {
        "mock"
    }

    fn load(
        &self,
        artifact: &ModelArtifact,
        _options: &PredictionOptions,
    ) -> anyhow::Result<MockModel> {
        if !artifact.path().is_file() {
            bail!("no graph at {}", artifact.path().display());
        }
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(MockModel {
            spec: ModelSpec::default(),
            backend: self.clone(),
        })
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            supports_dynamic_shapes: true,
            stateful_sessions: self.stateful,
        }
    }
}

impl BackendModel for MockModel {
    fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    fn infer(&mut self, inputs: Vec<Tensor>) -> anyhow::Result<Vec<Tensor>> {
        if let Ok(mut seen) = self.backend.seen.lock() {
            seen.extend(inputs.iter().map(|t| t.shape().clone()));
        }
        match &self.backend.script {
            Script::Echo => Ok(inputs),
            Script::Fixed(outputs) => Ok(outputs.clone()),
            Script::Fail => bail!("scripted failure"),
        }
    }

    fn reset(&mut self) -> anyhow::Result<()> {
        self.backend.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Local fetcher that counts how often it is asked for something.
#[derive(Default)]
pub struct CountingFetcher {
    inner: LocalFetcher,
    pub files: AtomicUsize,
    pub downloads: AtomicUsize,
    pub archives: AtomicUsize,
}

impl CountingFetcher {
    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for CountingFetcher {
    async fn fetch_file(
        &self,
        url: &str,
        dest: &Path,
        checksum: Option<&str>,
    ) -> Result<FetchOutcome, FetchError> {
        self.files.fetch_add(1, Ordering::SeqCst);
        let outcome = self.inner.fetch_file(url, dest, checksum).await?;
        if outcome == FetchOutcome::Downloaded {
            self.downloads.fetch_add(1, Ordering::SeqCst);
        }
        Ok(outcome)
    }

    async fn fetch_archive_into(&self, url: &str, dest_dir: &Path) -> Result<(), FetchError> {
        self.archives.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch_archive_into(url, dest_dir).await
    }
}

/// A "remote" directory holding a graph and a label file, plus a work dir.
pub struct ModelFixture {
    pub remote: TempDir,
    pub work: TempDir,
}

pub const LABELS: &str = "background\nperson\ncat\n";

impl ModelFixture {
    pub fn new() -> Self {
        let remote = tempfile::tempdir().unwrap();
        std::fs::write(remote.path().join("model.onnx"), b"graph bytes").unwrap();
        std::fs::write(remote.path().join("labels.txt"), LABELS).unwrap();
        Self {
            remote,
            work: tempfile::tempdir().unwrap(),
        }
    }

    pub fn graph_checksum(&self) -> String {
        sha256_file(&self.remote.path().join("model.onnx")).unwrap()
    }

    pub fn work_path(&self, name: &str) -> PathBuf {
        self.work.path().join(name)
    }

    pub fn descriptor(&self, modality: Modality) -> ModelDescriptor {
        let features = if modality.needs_features() {
            "features_path = \"labels.txt\"\n"
        } else {
            ""
        };
        let raw = format!(
            "name = \"fixture\"\n\
             modality = \"{modality}\"\n\
             work_dir = {work:?}\n\
             [[inputs]]\n\
             type = \"image\"\n\
             [model]\n\
             base_url = {base:?}\n\
             graph_path = \"model.onnx\"\n\
             {features}",
            work = self.work.path().display().to_string(),
            base = self.remote.path().display().to_string(),
        );
        ModelDescriptor::from_toml_str(&raw).unwrap()
    }
}

pub fn context(backend: &MockBackend, fetcher: Arc<dyn Fetcher>) -> PredictorContext {
    PredictorContext {
        backend: Arc::new(backend.clone()),
        fetcher,
        options: PredictionOptions::default(),
    }
}

pub fn f32_tensor(dims: &[usize], values: &[f32]) -> Tensor {
    Tensor::from_f32(Shape::from_slice(dims), values).unwrap()
}

/// `[c, h, w]` sample whose value at `(c, h, w)` is `c*100 + h*10 + w`.
pub fn coded_image(c: usize, h: usize, w: usize) -> Tensor {
    let mut values = Vec::with_capacity(c * h * w);
    for ci in 0..c {
        for hi in 0..h {
            for wi in 0..w {
                values.push((ci * 100 + hi * 10 + wi) as f32);
            }
        }
    }
    f32_tensor(&[c, h, w], &values)
}
