//! The update orchestrator.
//!
//! [`Updater`] composes the manifest store, downloader, verifier, installer,
//! and lock manager into the three caller-driven operations:
//!
//! - [`Updater::check`] - fetch the manifest and compare versions. Always
//!   persists the check timestamp and result, converting failures into an
//!   error outcome instead of propagating them.
//! - [`Updater::download`] - resolve the artifact for this platform,
//!   download it, and verify its checksum. Only a verified artifact is ever
//!   recorded as the pending update.
//! - [`Updater::apply`] - install, activate, clean up, and roll the state
//!   forward. Returns `false` when there is nothing verified to apply,
//!   since that is routine rather than exceptional.
//!
//! There is no hidden retry: every operation is idempotent and safe for the
//! caller to re-invoke, and that is the whole retry story. The orchestrator
//! tracks which phase it is in, mostly so the CLI can report what was
//! happening when something failed.

use anyhow::Result;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::constants::DEFAULT_KEEP_COUNT;
use crate::core::UpdateError;
use crate::download::{Downloader, ProgressFn};
use crate::host::{HostEnv, ProcessSpawner, RealHost, Spawner};
use crate::install::Installer;
use crate::layout::Layout;
use crate::locks::LockManager;
use crate::manifest::{ManifestStore, PlatformManifest};
use crate::platform::resolve_platform;
use crate::state::{CheckResult, PendingUpdate, StateStore, UpdateState};
use crate::verify::ChecksumVerifier;
use crate::version::is_newer;

/// Where the orchestrator currently is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePhase {
    Idle,
    Checking,
    Downloading,
    Verifying,
    Applying,
}

/// Outcome of a single update check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The local version is the latest release
    UpToDate { current: String },
    /// A newer release is available
    UpdateAvailable { current: String, latest: String },
    /// The check failed; the error is recorded, not raised
    Failed { message: String },
}

/// Point-in-time view of the update state for status reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    /// Version recorded in the state document
    pub current_version: String,
    /// Version the stable symlink resolves to, when one exists
    pub active_version: Option<String>,
    /// Epoch milliseconds of the last check, 0 when never checked
    pub last_check_time: i64,
    /// Result of the last check
    pub last_check_result: CheckResult,
    /// Newer version the last check reported, if any
    pub available_version: Option<String>,
    /// Downloaded-and-verified version awaiting apply, if any
    pub pending_version: Option<String>,
    /// Whether automatic checks are disabled
    pub disabled: bool,
}

/// Orchestrates check, download, and apply.
pub struct Updater {
    layout: Layout,
    manifests: ManifestStore,
    states: StateStore,
    downloader: Downloader,
    installer: Installer,
    locks: LockManager,
    spawner: Box<dyn Spawner>,
    manifest_url: Option<String>,
    state: UpdateState,
    phase: UpdatePhase,
}

impl Updater {
    /// Updater for the given state root, backed by the real host.
    ///
    /// `current_version` seeds the state document when none exists yet;
    /// callers pass the running binary's compiled-in version.
    pub fn new(layout: Layout, current_version: &str) -> Self {
        Self::with_host(
            layout,
            current_version,
            Arc::new(RealHost),
            Box::new(ProcessSpawner),
        )
    }

    /// Updater with explicit host and spawner capabilities, for tests and
    /// embedders.
    pub fn with_host(
        layout: Layout,
        current_version: &str,
        host: Arc<dyn HostEnv>,
        spawner: Box<dyn Spawner>,
    ) -> Self {
        let client = reqwest::Client::new();
        let manifests = ManifestStore::new(&layout, client.clone(), host.clone());
        let states = StateStore::new(&layout, host.clone());
        let downloader = Downloader::new(client);
        let installer = Installer::new(layout.clone(), host.clone());
        let locks = LockManager::new(&layout, host);
        let state = states.load(current_version);

        Self {
            layout,
            manifests,
            states,
            downloader,
            installer,
            locks,
            spawner,
            manifest_url: None,
            state,
            phase: UpdatePhase::Idle,
        }
    }

    /// Pin the manifest endpoint, overriding environment and default.
    pub fn with_manifest_url(mut self, url: impl Into<String>) -> Self {
        self.manifest_url = Some(url.into());
        self
    }

    pub fn phase(&self) -> UpdatePhase {
        self.phase
    }

    pub fn state(&self) -> &UpdateState {
        &self.state
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Check whether a newer release is available.
    ///
    /// The check timestamp and result are persisted on every call,
    /// including failures, which come back as [`CheckOutcome::Failed`]
    /// rather than an error. Prior available/pending fields survive a
    /// failed check untouched.
    pub async fn check(&mut self) -> CheckOutcome {
        self.phase = UpdatePhase::Checking;
        let current = self.state.current_version.clone();

        let outcome = match self.manifests.fetch_manifest(self.manifest_url.as_deref()).await {
            Ok(manifest) => {
                if is_newer(&manifest.version, &current) {
                    info!(%current, latest = %manifest.version, "update available");
                    self.state.last_check_result = CheckResult::UpdateAvailable;
                    self.state.available_version = Some(manifest.version.clone());
                    CheckOutcome::UpdateAvailable {
                        current,
                        latest: manifest.version,
                    }
                } else {
                    debug!(%current, "already up to date");
                    self.state.last_check_result = CheckResult::UpToDate;
                    self.state.available_version = None;
                    CheckOutcome::UpToDate { current }
                }
            }
            Err(error) => {
                let message = format!("{error:#}");
                warn!(error = %message, "update check failed");
                self.state.last_check_result = CheckResult::Error;
                CheckOutcome::Failed { message }
            }
        };

        self.state.last_check_time = Utc::now().timestamp_millis();
        self.states.persist(&self.state);
        self.phase = UpdatePhase::Idle;
        outcome
    }

    /// Download and verify the artifact for `version`.
    ///
    /// On a checksum match the artifact is recorded as the verified pending
    /// update. A mismatch raises and leaves any prior pending update
    /// untouched; the mismatching file is deleted best-effort.
    pub async fn download(
        &mut self,
        version: &str,
        on_progress: Option<ProgressFn>,
    ) -> Result<PathBuf> {
        self.phase = UpdatePhase::Downloading;
        let result = self.download_inner(version, on_progress).await;
        self.phase = UpdatePhase::Idle;
        result
    }

    async fn download_inner(
        &mut self,
        version: &str,
        on_progress: Option<ProgressFn>,
    ) -> Result<PathBuf> {
        let manifest = self.resolve_manifest_for(version).await?;
        let platform = resolve_platform().await?;
        let artifact =
            manifest
                .artifact_for(&platform)
                .ok_or_else(|| UpdateError::PlatformArtifactMissing {
                    platform: platform.clone(),
                    version: version.to_string(),
                })?;

        let path = self
            .downloader
            .download_update(artifact, &self.layout.downloads_dir(), on_progress)
            .await?;

        self.phase = UpdatePhase::Verifying;
        let outcome = ChecksumVerifier::verify_checksum(&path, &artifact.sha256).await?;
        if !outcome.valid {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(UpdateError::ChecksumMismatch {
                expected: artifact.sha256.clone(),
                actual: outcome.actual,
            }
            .into());
        }

        self.state.pending_update = Some(PendingUpdate {
            version: version.to_string(),
            path: path.clone(),
            verified: true,
        });
        self.states.persist(&self.state);
        info!(version, path = %path.display(), "update downloaded and verified");
        Ok(path)
    }

    /// Resolve a manifest that still advertises `version`.
    ///
    /// The endpoint may have moved on between check and download. When the
    /// live manifest no longer matches, the previously cached manifest is
    /// consulted; when that disagrees too, the download fails with
    /// [`UpdateError::ManifestDrift`] rather than guessing at an artifact.
    async fn resolve_manifest_for(&self, version: &str) -> Result<PlatformManifest> {
        // Snapshot the cache first: a successful live fetch replaces it, and
        // the fallback needs the manifest as it was when the caller decided
        // to download this version.
        let cached = self.manifests.cached_manifest().await;

        match self.manifests.fetch_manifest(self.manifest_url.as_deref()).await {
            Ok(manifest) if manifest.version == version => return Ok(manifest),
            Ok(manifest) => {
                debug!(live = %manifest.version, requested = version, "live manifest drifted");
            }
            Err(error) => {
                warn!(error = %format!("{error:#}"), "live manifest fetch failed, trying cache");
            }
        }

        match cached {
            Some(manifest) if manifest.version == version => Ok(manifest),
            _ => Err(UpdateError::ManifestDrift {
                version: version.to_string(),
            }
            .into()),
        }
    }

    /// Install and activate the pending update.
    ///
    /// Returns `Ok(false)` without touching anything when no verified
    /// pending update exists. On success the pending version becomes the
    /// current one, old versions are pruned (`force` bypasses lock
    /// protection), and the state rolls over to up-to-date.
    pub async fn apply(&mut self, force: bool) -> Result<bool> {
        let Some(pending) = self.state.pending_update.clone() else {
            debug!("no pending update to apply");
            return Ok(false);
        };
        if !pending.verified {
            warn!(version = %pending.version, "pending update is not verified, refusing to apply");
            return Ok(false);
        }

        self.phase = UpdatePhase::Applying;
        let result = self.apply_inner(&pending, force).await;
        self.phase = UpdatePhase::Idle;
        result.map(|()| true)
    }

    async fn apply_inner(&mut self, pending: &PendingUpdate, force: bool) -> Result<()> {
        self.installer
            .install_version(&pending.path, &pending.version)
            .await?;
        self.installer.activate_version(&pending.version).await?;

        if let Err(error) = self.installer.cleanup_old_versions(DEFAULT_KEEP_COUNT, force).await {
            warn!(error = %format!("{error:#}"), "version cleanup failed");
        }

        self.state.current_version = pending.version.clone();
        self.state.pending_update = None;
        self.state.available_version = None;
        self.state.last_check_result = CheckResult::UpToDate;
        self.states.persist(&self.state);

        self.prune_downloads().await;
        info!(version = %pending.version, "update applied");
        Ok(())
    }

    /// Remove download temp files no pending update references.
    async fn prune_downloads(&self) {
        let keep = self
            .state
            .pending_update
            .as_ref()
            .map(|pending| pending.path.clone());
        let Ok(mut entries) = tokio::fs::read_dir(self.layout.downloads_dir()).await else {
            return;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if Some(&path) == keep.as_ref() {
                continue;
            }
            if let Err(error) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), %error, "failed to prune download");
            }
        }
    }

    /// Whether enough time has passed since the last check.
    pub fn should_check(&self, now_ms: i64) -> bool {
        !self.state.disabled
            && now_ms.saturating_sub(self.state.last_check_time) >= self.state.check_interval_ms as i64
    }

    /// Fire a detached re-invocation of the updater in check-only mode.
    ///
    /// The child is never awaited, so a foreground command does not block on
    /// network latency. Spawn failure only logs.
    pub fn spawn_background_check(&self) {
        let args = ["update", "--check", "--background"]
            .map(String::from)
            .to_vec();
        if let Err(error) = self.spawner.spawn_detached(&args) {
            warn!(error = %format!("{error:#}"), "failed to spawn background check");
        } else {
            debug!("spawned background update check");
        }
    }

    /// Reactivate an older installed version and record it as current.
    pub async fn rollback(&mut self, version: &str) -> Result<()> {
        self.installer.rollback_version(version).await?;
        self.state.current_version = version.to_string();
        self.state.pending_update = None;
        self.state.available_version = None;
        self.states.persist(&self.state);
        Ok(())
    }

    /// Status snapshot for display, no network involved.
    pub fn status(&self) -> StatusReport {
        StatusReport {
            current_version: self.state.current_version.clone(),
            active_version: self.layout.active_version(),
            last_check_time: self.state.last_check_time,
            last_check_result: self.state.last_check_result,
            available_version: self.state.available_version.clone(),
            pending_version: self
                .state
                .pending_update
                .as_ref()
                .map(|pending| pending.version.clone()),
            disabled: self.state.disabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakeHost, RecordingSpawner};
    use tempfile::TempDir;

    fn updater(tmp: &TempDir) -> Updater {
        Updater::with_host(
            Layout::new(tmp.path()),
            "1.0.0",
            Arc::new(FakeHost::new(100)),
            Box::new(RecordingSpawner::default()),
        )
    }

    #[tokio::test]
    async fn apply_with_no_pending_update_returns_false_and_touches_nothing() {
        let tmp = TempDir::new().unwrap();
        let mut updater = updater(&tmp);

        assert!(!updater.apply(false).await.unwrap());
        assert_eq!(updater.phase(), UpdatePhase::Idle);
        assert!(!tmp.path().join("versions").exists());
        assert!(!tmp.path().join("bin").exists());
    }

    #[tokio::test]
    async fn apply_refuses_an_unverified_pending_update() {
        let tmp = TempDir::new().unwrap();
        let mut updater = updater(&tmp);
        updater.state.pending_update = Some(PendingUpdate {
            version: "2.0.0".into(),
            path: tmp.path().join("downloads/x.tar.gz"),
            verified: false,
        });

        assert!(!updater.apply(false).await.unwrap());
        assert!(updater.state().pending_update.is_some());
    }

    #[test]
    fn should_check_honors_interval_and_disable_flag() {
        let tmp = TempDir::new().unwrap();
        let mut updater = updater(&tmp);
        updater.state.check_interval_ms = 1_000;
        updater.state.last_check_time = 10_000;

        assert!(!updater.should_check(10_500));
        assert!(updater.should_check(11_000));
        assert!(updater.should_check(50_000));

        updater.state.disabled = true;
        assert!(!updater.should_check(50_000));
    }

    #[test]
    fn background_check_goes_through_the_spawner() {
        let tmp = TempDir::new().unwrap();
        let spawner = RecordingSpawner::default();
        let calls = spawner.calls();
        let updater = Updater::with_host(
            Layout::new(tmp.path()),
            "1.0.0",
            Arc::new(FakeHost::new(100)),
            Box::new(spawner),
        );

        updater.spawn_background_check();
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], vec!["update", "--check", "--background"]);
    }

    #[test]
    fn status_reflects_the_state_document() {
        let tmp = TempDir::new().unwrap();
        let mut updater = updater(&tmp);
        updater.state.available_version = Some("1.2.0".into());
        updater.state.last_check_result = CheckResult::UpdateAvailable;

        let status = updater.status();
        assert_eq!(status.current_version, "1.0.0");
        assert_eq!(status.available_version.as_deref(), Some("1.2.0"));
        assert_eq!(status.last_check_result, CheckResult::UpdateAvailable);
        assert_eq!(status.active_version, None);
        assert_eq!(status.pending_version, None);
    }
}
