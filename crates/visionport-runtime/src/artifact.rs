use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, instrument};
use visionport_core::{file_name, DescriptorError, Fetcher, ModelDescriptor, PredictorError, Result};

/// Local paths of everything a predictor needs to load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedArtifacts {
    pub work_dir: PathBuf,
    pub graph_path: PathBuf,
    pub features_path: Option<PathBuf>,
}

/// Maps a descriptor onto local files, fetching whatever is missing.
///
/// Retries are the fetcher's business; every failure is returned as is,
/// tagged with the resource that failed.
#[derive(Clone)]
pub struct ArtifactResolver {
    fetcher: Arc<dyn Fetcher>,
}

impl ArtifactResolver {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    #[instrument(skip_all, fields(model = %descriptor.canonical_name()))]
    pub async fn resolve(&self, descriptor: &ModelDescriptor) -> Result<ResolvedArtifacts> {
        let work_dir = descriptor.work_dir();
        let source = &descriptor.model;
        let graph_path = descriptor.graph_file()?;

        if source.is_archive {
            let url = source
                .base_url
                .as_deref()
                .ok_or(DescriptorError::MissingBaseUrl { field: "base_url" })?;
            if tokio::fs::try_exists(&graph_path).await.unwrap_or(false) {
                debug!(path = %graph_path.display(), "archive already unpacked");
            } else {
                debug!(url, "fetching model archive");
                self.fetcher
                    .fetch_archive_into(url, &work_dir)
                    .await
                    .map_err(|e| PredictorError::from_fetch(format!("model archive {url}"), e))?;
            }
        } else {
            let url = descriptor.graph_url()?;
            let outcome = self
                .fetcher
                .fetch_file(&url, &graph_path, source.graph_checksum.as_deref())
                .await
                .map_err(|e| PredictorError::from_fetch(format!("graph {url}"), e))?;
            debug!(?outcome, path = %graph_path.display(), "graph ready");
        }

        let features_path = if descriptor.modality.needs_features() {
            let url = descriptor
                .features_url()?
                .ok_or(DescriptorError::MissingFeatures(descriptor.modality))?;
            let path = work_dir.join(file_name(&url));
            let outcome = self
                .fetcher
                .fetch_file(&url, &path, source.features_checksum.as_deref())
                .await
                .map_err(|e| PredictorError::from_fetch(format!("features {url}"), e))?;
            debug!(?outcome, path = %path.display(), "features ready");
            Some(path)
        } else {
            None
        };

        Ok(ResolvedArtifacts {
            work_dir,
            graph_path,
            features_path,
        })
    }
}
