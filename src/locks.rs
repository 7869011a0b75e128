//! Per-process version locks.
//!
//! Cleanup must never delete a version directory whose binary some live
//! process still depends on. Every running instance writes a lock file named
//! by its own pid into `versions/locks/`, recording which version it runs.
//! These are advisory existence markers, not mutual-exclusion locks: holding
//! one proves nothing except "this pid claims this version", and the claim
//! only counts while the pid is verifiably alive.
//!
//! The lock directory has no central registry and heals itself: every scan
//! deletes lock files that are unparsable or whose pid is dead, so crashes
//! leave no permanent residue.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::host::HostEnv;
use crate::layout::Layout;

/// Contents of one lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockData {
    /// Pid of the process holding the lock
    pub pid: u32,
    /// Version that process depends on
    pub version: String,
    /// Epoch milliseconds when the lock was taken
    pub started_at: i64,
}

/// Answer to "is this version in use?".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockStatus {
    /// Whether at least one live process holds the version
    pub locked: bool,
    /// The pids holding it
    pub pids: Vec<u32>,
}

/// Manages the per-process lock files in `versions/locks/`.
pub struct LockManager {
    locks_dir: PathBuf,
    host: Arc<dyn HostEnv>,
}

impl LockManager {
    pub fn new(layout: &Layout, host: Arc<dyn HostEnv>) -> Self {
        Self {
            locks_dir: layout.locks_dir(),
            host,
        }
    }

    fn lock_path(&self, pid: u32) -> PathBuf {
        self.locks_dir.join(format!("{pid}.lock"))
    }

    /// Record that this process depends on `version`.
    ///
    /// Idempotent per pid: a second acquire overwrites the first, so a
    /// process always holds at most one lock reflecting its latest claim.
    pub fn acquire_lock(&self, version: &str) -> Result<()> {
        std::fs::create_dir_all(&self.locks_dir)
            .with_context(|| format!("failed to create {}", self.locks_dir.display()))?;

        let data = LockData {
            pid: self.host.pid(),
            version: version.to_string(),
            started_at: Utc::now().timestamp_millis(),
        };
        let body = serde_json::to_string_pretty(&data).context("failed to encode lock data")?;
        let path = self.lock_path(data.pid);
        std::fs::write(&path, body)
            .with_context(|| format!("failed to write {}", path.display()))?;

        debug!(pid = data.pid, version, "acquired version lock");
        Ok(())
    }

    /// Remove this process's lock file, best-effort.
    ///
    /// Already-removed is not an error; release is safe to call any number
    /// of times.
    pub fn release_lock(&self) {
        let path = self.lock_path(self.host.pid());
        match std::fs::remove_file(&path) {
            Ok(()) => debug!(path = %path.display(), "released version lock"),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => warn!(path = %path.display(), %error, "failed to release version lock"),
        }
    }

    /// Whether any live process holds `version`.
    ///
    /// A lock counts only if its recorded version matches and its pid passes
    /// the liveness probe. Stale and unparsable lock files encountered
    /// during the scan are deleted within the same call.
    pub fn is_version_locked(&self, version: &str) -> LockStatus {
        let mut pids = Vec::new();
        self.sweep(|data| {
            if data.version == version {
                pids.push(data.pid);
            }
        });
        LockStatus {
            locked: !pids.is_empty(),
            pids,
        }
    }

    /// Delete stale and unparsable lock files, returning how many were
    /// removed.
    pub fn clean_stale_locks(&self) -> usize {
        self.sweep(|_| {})
    }

    /// Walk every lock file: invoke `on_live` for live ones, delete the
    /// rest. Returns the number of files removed.
    fn sweep(&self, mut on_live: impl FnMut(&LockData)) -> usize {
        let entries = match std::fs::read_dir(&self.locks_dir) {
            Ok(entries) => entries,
            // No directory means no locks.
            Err(_) => return 0,
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("lock") {
                continue;
            }

            let parsed = std::fs::read_to_string(&path)
                .ok()
                .and_then(|body| serde_json::from_str::<LockData>(&body).ok());

            match parsed {
                Some(data) if self.host.process_alive(data.pid) => on_live(&data),
                Some(data) => {
                    debug!(pid = data.pid, version = %data.version, "removing stale lock");
                    if remove_lock_file(&path) {
                        removed += 1;
                    }
                }
                None => {
                    warn!(path = %path.display(), "removing unparsable lock file");
                    if remove_lock_file(&path) {
                        removed += 1;
                    }
                }
            }
        }
        removed
    }
}

fn remove_lock_file(path: &std::path::Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(error) => {
            warn!(path = %path.display(), %error, "failed to remove lock file");
            false
        }
    }
}
