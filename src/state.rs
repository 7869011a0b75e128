//! The persisted update-state document.
//!
//! `update-state.json` is advisory bookkeeping: which version this install
//! believes it runs, when updates were last checked and with what result,
//! and at most one downloaded-and-verified pending update. It is not the
//! source of truth for activation (the stable symlink is), so loading
//! tolerates corruption by falling back to defaults, persistence failures
//! only log, and concurrent writers are allowed to race (last writer wins).
//!
//! Loading is deliberately synchronous: it happens once at startup, before
//! any async machinery is worth spinning up.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::constants::{CHECK_INTERVAL_ENV, DEFAULT_CHECK_INTERVAL_MS, DISABLE_ENV};
use crate::host::HostEnv;
use crate::layout::Layout;

/// Result of the most recent update check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckResult {
    UpToDate,
    UpdateAvailable,
    Error,
}

/// A downloaded-and-verified update that has not been applied yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingUpdate {
    /// Version the artifact contains
    pub version: String,
    /// Path of the downloaded artifact
    pub path: PathBuf,
    /// Whether the artifact passed checksum verification
    pub verified: bool,
}

/// The update-state document.
///
/// `currentVersion`, `lastCheckTime`, and `checkIntervalMs` form the
/// structural guard: a state file where any of them is missing or carries the
/// wrong type fails deserialization as a whole and is replaced by a fresh
/// default state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateState {
    /// Version this install believes it currently runs
    pub current_version: String,
    /// Epoch milliseconds of the last check, 0 when never checked
    pub last_check_time: i64,
    /// Interval between automatic checks, in milliseconds
    pub check_interval_ms: u64,
    /// Result of the most recent check
    #[serde(default = "default_check_result")]
    pub last_check_result: CheckResult,
    /// Version the last check reported as available, if newer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_version: Option<String>,
    /// At most one downloaded-and-verified update awaiting apply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_update: Option<PendingUpdate>,
    /// Whether automatic update checks are disabled
    #[serde(default)]
    pub disabled: bool,
}

fn default_check_result() -> CheckResult {
    CheckResult::UpToDate
}

/// Loads and persists the update-state document.
pub struct StateStore {
    path: PathBuf,
    host: Arc<dyn HostEnv>,
}

impl StateStore {
    pub fn new(layout: &Layout, host: Arc<dyn HostEnv>) -> Self {
        Self {
            path: layout.state_file(),
            host,
        }
    }

    /// Load the state document, falling back to defaults.
    ///
    /// A missing file, unparsable JSON, or a document failing the structural
    /// guard all yield a fresh default state carrying `fallback_version`;
    /// this function never fails.
    pub fn load(&self, fallback_version: &str) -> UpdateState {
        match std::fs::read_to_string(&self.path) {
            Ok(body) => match serde_json::from_str::<UpdateState>(&body) {
                Ok(state) => state,
                Err(error) => {
                    warn!(path = %self.path.display(), %error, "corrupt update state, using defaults");
                    self.default_state(fallback_version)
                }
            },
            Err(error) => {
                if error.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %self.path.display(), %error, "unreadable update state, using defaults");
                }
                self.default_state(fallback_version)
            }
        }
    }

    /// Persist the state document. Failures are logged, never raised.
    pub fn persist(&self, state: &UpdateState) {
        let result = (|| {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let body = serde_json::to_string_pretty(state)?;
            std::fs::write(&self.path, body)?;
            anyhow::Ok(())
        })();

        if let Err(error) = result {
            warn!(path = %self.path.display(), error = %format!("{error:#}"), "failed to persist update state");
        } else {
            debug!(path = %self.path.display(), "persisted update state");
        }
    }

    /// A fresh default state for `fallback_version`, honoring the
    /// environment overrides for check interval and the disable flag.
    pub fn default_state(&self, fallback_version: &str) -> UpdateState {
        let check_interval_ms = self
            .host
            .env_var(CHECK_INTERVAL_ENV)
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(DEFAULT_CHECK_INTERVAL_MS);
        let disabled = self
            .host
            .env_var(DISABLE_ENV)
            .map(|value| matches!(value.trim(), "1" | "true" | "TRUE" | "True"))
            .unwrap_or(false);

        UpdateState {
            current_version: fallback_version.to_string(),
            last_check_time: 0,
            check_interval_ms,
            last_check_result: CheckResult::UpToDate,
            available_version: None,
            pending_update: None,
            disabled,
        }
    }
}
