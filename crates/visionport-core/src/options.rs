use std::collections::BTreeMap;
use std::time::Duration;

use crate::Device;

/// Resolved once when a predictor is built; read-only afterwards.
#[derive(Clone, Debug)]
pub struct PredictionOptions {
    pub device: Device,
    pub batch_size: usize,
    /// Upper bound for artifact fetches. `None` waits indefinitely.
    pub download_timeout: Option<Duration>,
    /// Backend specific knobs, e.g. `intra_threads`.
    pub backend: BTreeMap<String, String>,
}

impl Default for PredictionOptions {
    fn default() -> Self {
        Self {
            device: Device::Cpu,
            batch_size: 1,
            download_timeout: None,
            backend: BTreeMap::new(),
        }
    }
}

impl PredictionOptions {
    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = Some(timeout);
        self
    }

    pub fn with_backend_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.backend.insert(key.into(), value.into());
        self
    }

    pub fn backend_option(&self, key: &str) -> Option<&str> {
        self.backend.get(key).map(String::as_str)
    }
}
