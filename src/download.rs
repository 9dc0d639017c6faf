use crate::error::SyncError;
use crate::progress::ProgressObserver;
use reqwest::Client;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;

/// Body bytes are written and reported in blocks of this size.
pub const CHUNK_SIZE: usize = 100 * 1024;

pub struct Downloader {
    client: Client,
}

impl Downloader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Fetches `url` into `target_dir/filename` and returns the final path.
    ///
    /// An existing file is returned untouched, without any request, unless
    /// `replace_existing` is set. Bytes go to `<filename>.partial` and are
    /// renamed into place once the body has been read to the end, so an
    /// interrupted download never leaves a file at the final path.
    pub async fn download_file(
        &self,
        target_dir: &Path,
        replace_existing: bool,
        url: &Url,
        filename: &Path,
        label: &str,
        progress: &mut dyn ProgressObserver,
    ) -> Result<PathBuf, SyncError> {
        let dst = target_dir.join(filename);
        if dst.exists() && !replace_existing {
            info!(path = %dst.display(), "Output file already exists");
            return Ok(dst);
        }

        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| SyncError::Network {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let total_size = response.content_length().unwrap_or(0);
        debug!(url = %url, total_size, "Downloading");

        let partial = partial_path(&dst);
        let mut file = File::create(&partial)
            .await
            .map_err(|e| SyncError::io(&partial, e))?;

        progress.begin(label, total_size);
        let mut pending: Vec<u8> = Vec::with_capacity(CHUNK_SIZE);
        let mut byte_count = 0_u64;

        while let Some(bytes) = response.chunk().await.map_err(|source| SyncError::Network {
            url: url.to_string(),
            source,
        })? {
            pending.extend_from_slice(&bytes);
            while pending.len() >= CHUNK_SIZE {
                file.write_all(&pending[..CHUNK_SIZE])
                    .await
                    .map_err(|e| SyncError::io(&partial, e))?;
                pending.drain(..CHUNK_SIZE);
                byte_count += CHUNK_SIZE as u64;
                progress.advance(byte_count, total_size);
            }
        }

        if !pending.is_empty() {
            file.write_all(&pending)
                .await
                .map_err(|e| SyncError::io(&partial, e))?;
            byte_count += pending.len() as u64;
            progress.advance(byte_count, total_size);
        }

        file.flush().await.map_err(|e| SyncError::io(&partial, e))?;
        drop(file);

        fs::rename(&partial, &dst)
            .await
            .map_err(|e| SyncError::io(&dst, e))?;
        progress.finish();

        info!(path = %dst.display(), bytes = byte_count, "Download complete");
        Ok(dst)
    }
}

fn partial_path(dst: &Path) -> PathBuf {
    let mut name = OsString::from(dst.as_os_str());
    name.push(".partial");
    PathBuf::from(name)
}
