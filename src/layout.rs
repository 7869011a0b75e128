//! On-disk layout of the update state root.
//!
//! Everything the updater touches lives under a single state root, by default
//! `~/.outpost`:
//!
//! ```text
//! ~/.outpost/
//! ├── manifest.json            cached release manifest
//! ├── update-state.json        persisted update state
//! ├── downloads/               in-flight artifact temp files
//! ├── versions/
//! │   ├── 1.4.2/outpost        one extracted tree per installed version
//! │   └── locks/<pid>.lock     per-process version locks
//! └── bin/outpost              stable symlink to the active binary
//! ```
//!
//! The stable symlink is the single source of truth for which version is
//! active; nothing else records activation.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::constants::{MANIFEST_CACHE_FILE, STATE_FILE, binary_file_name};

/// Well-known paths derived from one state root.
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    /// Layout rooted at an explicit directory. Used directly by tests and by
    /// the `OUTPOST_HOME` override.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Layout rooted at the default location under the home directory.
    pub fn default_root() -> Result<Self> {
        let home = dirs::home_dir().context("could not determine home directory")?;
        Ok(Self::new(home.join(".outpost")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the cached release manifest.
    pub fn manifest_cache(&self) -> PathBuf {
        self.root.join(MANIFEST_CACHE_FILE)
    }

    /// Path of the persisted update state document.
    pub fn state_file(&self) -> PathBuf {
        self.root.join(STATE_FILE)
    }

    /// Directory holding in-flight download temp files.
    pub fn downloads_dir(&self) -> PathBuf {
        self.root.join("downloads")
    }

    /// Directory holding one extracted tree per installed version.
    pub fn versions_dir(&self) -> PathBuf {
        self.root.join("versions")
    }

    /// Directory holding per-process lock files.
    pub fn locks_dir(&self) -> PathBuf {
        self.versions_dir().join("locks")
    }

    /// Extracted tree of one installed version.
    pub fn version_dir(&self, version: &str) -> PathBuf {
        self.versions_dir().join(version)
    }

    /// The product binary inside one installed version.
    pub fn version_binary(&self, version: &str) -> PathBuf {
        self.version_dir(version).join(binary_file_name())
    }

    /// Directory holding the stable symlink.
    pub fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }

    /// The stable symlink resolving to the active binary.
    pub fn active_link(&self) -> PathBuf {
        self.bin_dir().join(binary_file_name())
    }

    /// Version the stable symlink currently resolves to, if any.
    ///
    /// Recovered purely from the link target (`versions/<v>/outpost`), so it
    /// is correct even when the state document is stale or corrupt.
    pub fn active_version(&self) -> Option<String> {
        let target = std::fs::read_link(self.active_link()).ok()?;
        let version = target.parent()?.file_name()?;
        Some(version.to_string_lossy().into_owned())
    }
}
