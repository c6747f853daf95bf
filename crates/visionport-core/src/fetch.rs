use std::path::Path;

use async_trait::async_trait;

use crate::FetchError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    Downloaded,
    /// The destination already held a valid copy.
    AlreadyPresent,
}

/// Artifact acquisition capability.
///
/// Implementations own caching and retry policy. A `checksum` is a hex
/// SHA-256 digest; when given, the fetched bytes must match it.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch_file(
        &self,
        url: &str,
        dest: &Path,
        checksum: Option<&str>,
    ) -> Result<FetchOutcome, FetchError>;

    async fn fetch_archive_into(&self, url: &str, dest_dir: &Path) -> Result<(), FetchError>;
}
