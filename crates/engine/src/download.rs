//! Streaming artifact downloads.
//!
//! The local path mirrors the URL path below a destination directory (or only
//! the file name when stripping). Concurrent downloads to the same path are
//! serialized; different paths proceed in parallel.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::{Client, header};
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;
use wpsprobe_types::WpsError;
use wpsprobe_util::http::status_error_message;
use wpsprobe_util::local_path_for_url;

/// Size of the write buffer between the response stream and the file.
pub const WRITE_BUFFER_SIZE: usize = 8 * 1024;

/// Fetches URLs into local files.
pub struct Downloader {
    http: Client,
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl Downloader {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Downloader with its own HTTP client.
    ///
    /// `read_timeout` bounds the silence between two reads, not the whole
    /// transfer; a large artifact streaming steadily is only limited by the run
    /// deadline.
    pub fn with_timeouts(connect_timeout: Duration, read_timeout: Duration) -> Result<Self, WpsError> {
        let http = Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .user_agent(format!("wpsprobe/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|error| WpsError::configuration(format!("build download client: {error}")))?;
        Ok(Self::new(http))
    }

    /// Download `url` below `destination_dir` and return the local path.
    ///
    /// With `strip` the file lands directly in `destination_dir`; otherwise the URL
    /// path is recreated below it. Fetching the same URL twice overwrites the file.
    pub async fn fetch(&self, url: &str, destination_dir: &Path, strip: bool) -> Result<PathBuf, WpsError> {
        let parsed = Url::parse(url).map_err(|error| WpsError::download(url, format!("invalid url: {error}")))?;
        let path = local_path_for_url(&parsed, destination_dir, strip).map_err(|error| WpsError::download(url, error))?;

        let lock = self.path_lock(&path).await;
        let outcome = {
            let _guard = lock.lock().await;
            self.stream_to_file(&parsed, &path).await
        };
        self.release_path_lock(&path, lock).await;

        let written = outcome?;
        info!(%url, path = %path.display(), bytes = written, "downloaded artifact");
        Ok(path)
    }

    async fn stream_to_file(&self, url: &Url, path: &Path) -> Result<u64, WpsError> {
        if let Some(parent) = path.parent() {
            ensure_directory(parent)
                .await
                .map_err(|error| WpsError::download(url.as_str(), format!("create {}: {error}", parent.display())))?;
        }

        let response = self
            .http
            .get(url.clone())
            .header(header::ACCEPT, "*/*")
            .send()
            .await
            .map_err(|error| WpsError::download(url.as_str(), error))?;
        let status = response.status();
        if !status.is_success() {
            let reason = status_error_message(status.as_u16()).unwrap_or_else(|| format!("HTTP {status}"));
            return Err(WpsError::download(url.as_str(), reason));
        }

        let file = File::create(path)
            .await
            .map_err(|error| WpsError::download(url.as_str(), format!("create {}: {error}", path.display())))?;
        let mut writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|error| WpsError::download(url.as_str(), error))?;
            if chunk.is_empty() {
                continue;
            }
            writer
                .write_all(&chunk)
                .await
                .map_err(|error| WpsError::download(url.as_str(), error))?;
            written += chunk.len() as u64;
        }
        writer.flush().await.map_err(|error| WpsError::download(url.as_str(), error))?;
        debug!(%url, bytes = written, "stream complete");
        Ok(written)
    }

    async fn path_lock(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(path.to_path_buf()).or_default().clone()
    }

    /// Drop the lock entry once no other download holds or waits for it.
    async fn release_path_lock(&self, path: &Path, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        // One reference in the map, one here.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(path);
        }
    }
}

/// Create `directory` and its parents; an already existing directory is fine.
async fn ensure_directory(directory: &Path) -> io::Result<()> {
    match fs::create_dir_all(directory).await {
        Err(error) if error.kind() == io::ErrorKind::AlreadyExists => {
            if fs::metadata(directory).await.is_ok_and(|meta| meta.is_dir()) { Ok(()) } else { Err(error) }
        }
        other => other,
    }
}
