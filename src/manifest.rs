//! Release manifest fetching, validation, and caching.
//!
//! The manifest is a JSON document published at a fixed HTTPS endpoint
//! describing the latest release: its version, release date, the minimum
//! runtime version it requires, and one artifact entry (url, sha256, size)
//! per platform key.
//!
//! A fetched manifest is only accepted in full: any schema violation rejects
//! the whole document, because a partially trusted release description is
//! how half-updated installs happen. Accepted manifests are cached to the
//! state root so `download` can tolerate the endpoint drifting to a newer
//! release between check and download; the cache write is best-effort and
//! never fails the fetch.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::constants::{DEFAULT_MANIFEST_URL, MANIFEST_FETCH_TIMEOUT, MANIFEST_URL_ENV};
use crate::core::UpdateError;
use crate::host::HostEnv;
use crate::layout::Layout;

/// One downloadable artifact for one platform key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformArtifact {
    /// Download URL of the compressed archive
    pub url: String,
    /// Hex SHA-256 of the archive (64 characters)
    pub sha256: String,
    /// Advertised archive size in bytes
    pub size: u64,
}

/// The release manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformManifest {
    /// Version of the latest release
    pub version: String,
    /// Human-readable release date
    pub release_date: String,
    /// Minimum runtime version this release requires
    pub min_runtime_version: String,
    /// Artifact entry per platform key
    pub platforms: HashMap<String, PlatformArtifact>,
}

impl PlatformManifest {
    /// Validate the manifest schema.
    ///
    /// Requires a non-empty version, release date, and minimum runtime
    /// version, and for every platform entry a well-formed URL, a 64-hex-char
    /// sha256, and a positive size. One bad entry rejects the manifest.
    pub fn validate(&self) -> Result<(), UpdateError> {
        let invalid = |reason: String| UpdateError::ManifestInvalid { reason };

        if self.version.trim().is_empty() {
            return Err(invalid("version is empty".into()));
        }
        if self.release_date.trim().is_empty() {
            return Err(invalid("releaseDate is empty".into()));
        }
        if self.min_runtime_version.trim().is_empty() {
            return Err(invalid("minRuntimeVersion is empty".into()));
        }
        for (platform, artifact) in &self.platforms {
            if reqwest::Url::parse(&artifact.url).is_err() {
                return Err(invalid(format!("platform '{platform}' has a malformed url")));
            }
            let sha = &artifact.sha256;
            if sha.len() != 64 || !sha.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(invalid(format!(
                    "platform '{platform}' has an invalid sha256 '{sha}'"
                )));
            }
            if artifact.size == 0 {
                return Err(invalid(format!("platform '{platform}' has a zero size")));
            }
        }
        Ok(())
    }

    /// Artifact entry for a platform key, if the release covers it.
    pub fn artifact_for(&self, platform: &str) -> Option<&PlatformArtifact> {
        self.platforms.get(platform)
    }
}

/// Fetches and caches the release manifest.
pub struct ManifestStore {
    client: reqwest::Client,
    cache_path: PathBuf,
    host: Arc<dyn HostEnv>,
}

impl ManifestStore {
    pub fn new(layout: &Layout, client: reqwest::Client, host: Arc<dyn HostEnv>) -> Self {
        Self {
            client,
            cache_path: layout.manifest_cache(),
            host,
        }
    }

    /// The manifest endpoint, honoring an explicit override, then the
    /// environment, then the built-in default.
    pub fn manifest_url(&self, override_url: Option<&str>) -> String {
        if let Some(url) = override_url {
            return url.to_string();
        }
        self.host
            .env_var(MANIFEST_URL_ENV)
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MANIFEST_URL.to_string())
    }

    /// Fetch, validate, and cache the release manifest.
    ///
    /// The request is bounded by a 15 second timeout and aborted at the
    /// deadline. A non-2xx status, a JSON parse failure, or any schema
    /// violation fails the fetch. The cache write afterwards is best-effort;
    /// failure is logged and the fetched manifest is still returned.
    pub async fn fetch_manifest(&self, url: Option<&str>) -> Result<PlatformManifest> {
        let url = self.manifest_url(url);
        debug!(%url, "fetching release manifest");

        let response = self
            .client
            .get(&url)
            .timeout(MANIFEST_FETCH_TIMEOUT)
            .send()
            .await
            .with_context(|| format!("failed to fetch release manifest from {url}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::HttpStatus {
                status: status.as_u16(),
                url,
            }
            .into());
        }

        let body = response
            .text()
            .await
            .context("failed to read release manifest body")?;
        let manifest: PlatformManifest = serde_json::from_str(&body)
            .map_err(|e| UpdateError::ManifestInvalid { reason: e.to_string() })?;
        manifest.validate()?;

        self.write_cache(&manifest).await;
        Ok(manifest)
    }

    /// Read the cached manifest, `None` on any failure.
    ///
    /// Absence of a valid cache is routine (first run, cleared state root,
    /// stale schema), so this never errors.
    pub async fn cached_manifest(&self) -> Option<PlatformManifest> {
        let body = tokio::fs::read_to_string(&self.cache_path).await.ok()?;
        let manifest: PlatformManifest = serde_json::from_str(&body).ok()?;
        manifest.validate().ok()?;
        Some(manifest)
    }

    async fn write_cache(&self, manifest: &PlatformManifest) {
        let result = async {
            if let Some(parent) = self.cache_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let body = serde_json::to_string_pretty(manifest)?;
            tokio::fs::write(&self.cache_path, body).await?;
            anyhow::Ok(())
        }
        .await;

        if let Err(error) = result {
            warn!(path = %self.cache_path.display(), error = %format!("{error:#}"), "failed to cache release manifest");
        }
    }
}
