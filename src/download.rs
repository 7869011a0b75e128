//! Artifact downloading.
//!
//! Downloads stream the response body into memory and write the destination
//! file exactly once, after the full body has arrived. There is never a
//! partial artifact on disk: either the temp file does not exist, or it is
//! complete. Temp names combine a timestamp with a random suffix so
//! concurrent downloaders cannot collide.

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

use crate::constants::{BINARY_NAME, DOWNLOAD_TIMEOUT};
use crate::core::UpdateError;
use crate::manifest::PlatformArtifact;

/// Progress callback receiving an integer percentage, 0 to 100.
pub type ProgressFn = Box<dyn FnMut(u8) + Send>;

/// Emits each distinct download percentage exactly once, in order.
struct ProgressEmitter {
    callback: Option<ProgressFn>,
    last: Option<u8>,
}

impl ProgressEmitter {
    fn new(callback: Option<ProgressFn>) -> Self {
        Self { callback, last: None }
    }

    fn update(&mut self, received: u64, total: u64) {
        let Some(callback) = self.callback.as_mut() else {
            return;
        };
        if total == 0 {
            return;
        }
        let pct = ((received * 100) / total).min(100) as u8;
        if self.last != Some(pct) {
            self.last = Some(pct);
            callback(pct);
        }
    }
}

/// Streams release artifacts to disk.
pub struct Downloader {
    client: reqwest::Client,
}

impl Downloader {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Download an artifact into `dest_dir`, returning the temp file path.
    ///
    /// Requires a 2xx response with a non-empty body, bounded by a 5 minute
    /// timeout. Progress is reported against the response's declared length
    /// when present, falling back to the manifest's advertised size. The
    /// file is written in one operation once the body is fully received.
    pub async fn download_update(
        &self,
        artifact: &PlatformArtifact,
        dest_dir: &Path,
        on_progress: Option<ProgressFn>,
    ) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dest_dir)
            .await
            .with_context(|| format!("failed to create {}", dest_dir.display()))?;

        let file_name = format!(
            "{BINARY_NAME}-{}-{}.tar.gz",
            Utc::now().timestamp_millis(),
            Uuid::new_v4().simple()
        );
        let dest = dest_dir.join(file_name);

        debug!(url = %artifact.url, "downloading artifact");
        let mut response = self
            .client
            .get(&artifact.url)
            .timeout(DOWNLOAD_TIMEOUT)
            .send()
            .await
            .with_context(|| format!("failed to download {}", artifact.url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::HttpStatus {
                status: status.as_u16(),
                url: artifact.url.clone(),
            }
            .into());
        }

        // The response's own length wins over the manifest's advertised size.
        let total = response
            .content_length()
            .filter(|len| *len > 0)
            .unwrap_or(artifact.size);

        let mut emitter = ProgressEmitter::new(on_progress);
        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .with_context(|| format!("connection lost downloading {}", artifact.url))?
        {
            body.extend_from_slice(&chunk);
            emitter.update(body.len() as u64, total);
        }

        if body.is_empty() {
            return Err(UpdateError::EmptyDownload {
                url: artifact.url.clone(),
            }
            .into());
        }

        tokio::fs::write(&dest, &body)
            .await
            .with_context(|| format!("failed to write {}", dest.display()))?;

        info!(path = %dest.display(), bytes = body.len(), "artifact downloaded");
        Ok(dest)
    }
}
