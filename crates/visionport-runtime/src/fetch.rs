//! Fetch capability implementations.
//!
//! Files are staged in a temp file next to their destination and only
//! persisted once the checksum (if any) matches, so an interrupted or
//! corrupt download never sits at the final path.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use visionport_core::{FetchError, FetchOutcome, Fetcher};

/// Hex SHA-256 of a file's contents.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

pub fn checksum_matches(expected: &str, actual: &str) -> bool {
    expected.trim().eq_ignore_ascii_case(actual)
}

fn download_error(url: &str, err: impl Into<anyhow::Error>) -> FetchError {
    FetchError::Download {
        url: url.to_string(),
        source: err.into(),
    }
}

/// Whether `dest` can be reused without fetching again.
async fn reusable(dest: &Path, checksum: Option<&str>) -> bool {
    if !tokio::fs::try_exists(dest).await.unwrap_or(false) {
        return false;
    }
    let Some(expected) = checksum else {
        return true;
    };
    let path = dest.to_path_buf();
    match tokio::task::spawn_blocking(move || sha256_file(&path)).await {
        Ok(Ok(actual)) => checksum_matches(expected, &actual),
        _ => false,
    }
}

fn staging_file(url: &str, dest: &Path) -> Result<NamedTempFile, FetchError> {
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .with_context(|| format!("cannot create {}", parent.display()))
        .map_err(|e| download_error(url, e))?;
    NamedTempFile::new_in(parent).map_err(|e| download_error(url, e))
}

/// Moves a staged download into place, or discards it on checksum mismatch.
fn commit(
    url: &str,
    staged: NamedTempFile,
    dest: &Path,
    expected: Option<&str>,
    actual: &str,
) -> Result<FetchOutcome, FetchError> {
    if let Some(expected) = expected {
        if !checksum_matches(expected, actual) {
            return Err(FetchError::Integrity {
                path: dest.to_path_buf(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }
    }
    staged
        .persist(dest)
        .map_err(|e| download_error(url, e.error))?;
    Ok(FetchOutcome::Downloaded)
}

fn unpack_tarball(archive: &Path, dest_dir: &Path) -> io::Result<()> {
    let file = File::open(archive)?;
    let mut tarball = tar::Archive::new(flate2::read::GzDecoder::new(file));
    fs::create_dir_all(dest_dir)?;
    tarball.unpack(dest_dir)
}

fn copy_dir(src: &Path, dest: &Path) -> io::Result<()> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn local_path(url: &str) -> PathBuf {
    PathBuf::from(url.strip_prefix("file://").unwrap_or(url))
}

/// Serves `file://` URLs and plain filesystem paths.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalFetcher;

#[async_trait]
impl Fetcher for LocalFetcher {
    async fn fetch_file(
        &self,
        url: &str,
        dest: &Path,
        checksum: Option<&str>,
    ) -> Result<FetchOutcome, FetchError> {
        if reusable(dest, checksum).await {
            debug!(path = %dest.display(), "artifact already present");
            return Ok(FetchOutcome::AlreadyPresent);
        }

        let src = local_path(url);
        let url_owned = url.to_string();
        let dest_owned = dest.to_path_buf();
        let expected = checksum.map(str::to_string);
        let outcome = tokio::task::spawn_blocking(move || {
            let url = url_owned.as_str();
            let mut staged = staging_file(url, &dest_owned)?;
            let mut source = File::open(&src)
                .with_context(|| format!("cannot open {}", src.display()))
                .map_err(|e| download_error(url, e))?;
            io::copy(&mut source, staged.as_file_mut()).map_err(|e| download_error(url, e))?;
            let actual = sha256_file(staged.path()).map_err(|e| download_error(url, e))?;
            commit(url, staged, &dest_owned, expected.as_deref(), &actual)
        })
        .await
        .map_err(|e| download_error(url, e))??;

        info!(url, path = %dest.display(), "artifact copied");
        Ok(outcome)
    }

    async fn fetch_archive_into(&self, url: &str, dest_dir: &Path) -> Result<(), FetchError> {
        let src = local_path(url);
        let dest_dir = dest_dir.to_path_buf();
        tokio::task::spawn_blocking(move || {
            if src.is_dir() {
                copy_dir(&src, &dest_dir)
            } else {
                unpack_tarball(&src, &dest_dir)
            }
        })
        .await
        .map_err(|e| download_error(url, e))?
        .map_err(|e| download_error(url, e))?;

        info!(url, "archive unpacked");
        Ok(())
    }
}

/// Serves `http://` and `https://` URLs.
#[derive(Clone, Debug, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Streams `url` into a staged file next to `dest`, returning it with its digest.
    async fn download(
        &self,
        url: &str,
        dest: &Path,
    ) -> Result<(NamedTempFile, String), FetchError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| download_error(url, e))?;
        if !response.status().is_success() {
            return Err(download_error(url, anyhow!("HTTP {}", response.status())));
        }

        let mut staged = staging_file(url, dest)?;
        let mut hasher = Sha256::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| download_error(url, e))? {
            hasher.update(&chunk);
            staged
                .write_all(&chunk)
                .map_err(|e| download_error(url, e))?;
        }
        staged.flush().map_err(|e| download_error(url, e))?;

        Ok((staged, hex::encode(hasher.finalize())))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_file(
        &self,
        url: &str,
        dest: &Path,
        checksum: Option<&str>,
    ) -> Result<FetchOutcome, FetchError> {
        if reusable(dest, checksum).await {
            debug!(path = %dest.display(), "artifact already present");
            return Ok(FetchOutcome::AlreadyPresent);
        }

        let (staged, actual) = self.download(url, dest).await?;
        let outcome = commit(url, staged, dest, checksum, &actual)?;
        info!(url, path = %dest.display(), "artifact downloaded");
        Ok(outcome)
    }

    async fn fetch_archive_into(&self, url: &str, dest_dir: &Path) -> Result<(), FetchError> {
        let (staged, _) = self.download(url, &dest_dir.join(".archive")).await?;
        let dest_dir = dest_dir.to_path_buf();
        tokio::task::spawn_blocking(move || unpack_tarball(staged.path(), &dest_dir))
            .await
            .map_err(|e| download_error(url, e))?
            .map_err(|e| download_error(url, e))?;

        info!(url, "archive unpacked");
        Ok(())
    }
}

/// Routes each URL to the local or HTTP fetcher by scheme.
#[derive(Clone, Debug, Default)]
pub struct SchemeFetcher {
    local: LocalFetcher,
    http: HttpFetcher,
}

impl SchemeFetcher {
    pub fn new(http: HttpFetcher) -> Self {
        Self {
            local: LocalFetcher,
            http,
        }
    }

    fn route(&self, url: &str) -> &dyn Fetcher {
        if url.starts_with("http://") || url.starts_with("https://") {
            &self.http
        } else {
            &self.local
        }
    }
}

#[async_trait]
impl Fetcher for SchemeFetcher {
    async fn fetch_file(
        &self,
        url: &str,
        dest: &Path,
        checksum: Option<&str>,
    ) -> Result<FetchOutcome, FetchError> {
        self.route(url).fetch_file(url, dest, checksum).await
    }

    async fn fetch_archive_into(&self, url: &str, dest_dir: &Path) -> Result<(), FetchError> {
        self.route(url).fetch_archive_into(url, dest_dir).await
    }
}
