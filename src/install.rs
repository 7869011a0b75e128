//! Version installation, activation, cleanup, and rollback.
//!
//! Each release is a full replacement tree extracted into its own
//! `versions/<version>/` directory, so installs never touch the running
//! binary. Activation is the only visibility boundary: a uniquely named
//! temporary symlink is created next to the stable one and renamed over it,
//! which the filesystem performs atomically. A reader resolving the stable
//! path observes either the old target or the new one, never a broken link.
//!
//! Cleanup retains the newest few versions and refuses to touch the version
//! the stable symlink resolves to or any version a live process has locked.
//! Keeping history is what makes [`Installer::rollback_version`] possible:
//! rollback is nothing more than reactivating an older tree that cleanup
//! preserved.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::constants::BINARY_NAME;
use crate::core::UpdateError;
use crate::host::HostEnv;
use crate::layout::Layout;
use crate::locks::LockManager;
use crate::version::compare_versions;

/// Installs, activates, and prunes version trees.
pub struct Installer {
    layout: Layout,
    locks: LockManager,
}

impl Installer {
    pub fn new(layout: Layout, host: Arc<dyn HostEnv>) -> Self {
        let locks = LockManager::new(&layout, host);
        Self { layout, locks }
    }

    /// Extract an artifact into `versions/<version>/`.
    ///
    /// Extraction shells out to the system tar; its exit status and captured
    /// stderr are the entire contract, and a non-zero exit fails loudly with
    /// both.
    pub async fn install_version(&self, tarball: &Path, version: &str) -> Result<()> {
        let dir = self.layout.version_dir(version);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;

        let output = Command::new("tar")
            .arg("-xzf")
            .arg(tarball)
            .arg("-C")
            .arg(&dir)
            .output()
            .await
            .context("failed to run tar")?;

        if !output.status.success() {
            return Err(UpdateError::ExtractionFailed {
                archive: tarball.display().to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }

        info!(version, dir = %dir.display(), "installed version");
        Ok(())
    }

    /// Atomically repoint the stable symlink at `version`'s binary.
    ///
    /// Creates a uniquely named temporary symlink and renames it over the
    /// stable path. If anything fails before the rename, the temp link is
    /// removed and the stable link is untouched; once the rename has
    /// happened the new version is fully active.
    pub async fn activate_version(&self, version: &str) -> Result<()> {
        let binary = self.layout.version_binary(version);
        if !tokio::fs::try_exists(&binary).await.unwrap_or(false) {
            return Err(UpdateError::BinaryMissing {
                version: version.to_string(),
                path: binary.display().to_string(),
            }
            .into());
        }

        let bin_dir = self.layout.bin_dir();
        tokio::fs::create_dir_all(&bin_dir)
            .await
            .with_context(|| format!("failed to create {}", bin_dir.display()))?;

        let stable = self.layout.active_link();
        let temp = bin_dir.join(format!(".{BINARY_NAME}-{}.tmp", uuid::Uuid::new_v4().simple()));

        make_symlink(&binary, &temp)
            .with_context(|| format!("failed to create symlink {}", temp.display()))?;
        if let Err(error) = std::fs::rename(&temp, &stable) {
            let _ = std::fs::remove_file(&temp);
            return Err(error)
                .with_context(|| format!("failed to activate version {version}"));
        }

        info!(version, link = %stable.display(), "activated version");
        Ok(())
    }

    /// Remove old version trees, keeping the newest `keep_count`.
    ///
    /// The version the stable symlink resolves to is never removed. Versions
    /// locked by a live process are skipped unless `force` is set. Each
    /// removal is independent and best-effort; one failure does not abort
    /// the rest. Returns how many trees were removed.
    pub async fn cleanup_old_versions(&self, keep_count: usize, force: bool) -> Result<usize> {
        let versions = self.installed_versions().await?;
        let active = self.layout.active_version();

        let mut removed = 0;
        for version in versions.iter().skip(keep_count) {
            if Some(version) == active.as_ref() {
                debug!(version, "skipping active version");
                continue;
            }
            if !force {
                let status = self.locks.is_version_locked(version);
                if status.locked {
                    info!(version, pids = ?status.pids, "skipping locked version");
                    continue;
                }
            }
            match tokio::fs::remove_dir_all(self.layout.version_dir(version)).await {
                Ok(()) => {
                    info!(version, "removed old version");
                    removed += 1;
                }
                Err(error) => {
                    warn!(version, %error, "failed to remove old version");
                }
            }
        }
        Ok(removed)
    }

    /// Reactivate an older, still-installed version.
    pub async fn rollback_version(&self, previous_version: &str) -> Result<()> {
        let binary = self.layout.version_binary(previous_version);
        if !tokio::fs::try_exists(&binary).await.unwrap_or(false) {
            return Err(UpdateError::BinaryMissing {
                version: previous_version.to_string(),
                path: binary.display().to_string(),
            }
            .into());
        }
        info!(version = previous_version, "rolling back");
        self.activate_version(previous_version).await
    }

    /// Installed version directory names, newest first.
    ///
    /// Only names shaped like dotted numeric versions participate; anything
    /// else under `versions/` (the lock directory, editor droppings) is
    /// ignored.
    pub async fn installed_versions(&self) -> Result<Vec<String>> {
        let dir = self.layout.versions_dir();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => {
                return Err(error).with_context(|| format!("failed to list {}", dir.display()));
            }
        };

        let mut versions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if looks_like_version(&name) {
                versions.push(name);
            }
        }
        versions.sort_by(|a, b| compare_versions(b, a));
        Ok(versions)
    }
}

fn looks_like_version(name: &str) -> bool {
    !name.is_empty()
        && name
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
}

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn make_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}
