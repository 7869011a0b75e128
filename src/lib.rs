//! Outpost - self-updating command-line agent
//!
//! This crate implements the self-update subsystem for the `outpost` binary:
//! release discovery, artifact download and verification, side-by-side version
//! installation, atomic activation, and cleanup that never pulls a binary out
//! from under a live process.
//!
//! # Architecture Overview
//!
//! Updates flow through an explicit pipeline owned by [`updater::Updater`]:
//!
//! ```text
//! 1. Check
//!    ├── Fetch the release manifest (bounded timeout, schema validated)
//!    └── Compare the advertised version against the local state
//!
//! 2. Download
//!    ├── Resolve this machine's platform key
//!    ├── Stream the artifact to a uniquely named temp file
//!    └── Verify its SHA-256 against the manifest before recording it
//!
//! 3. Apply
//!    ├── Extract into versions/<version>/
//!    ├── Atomically repoint the stable bin symlink
//!    └── Prune old versions, skipping anything active or still in use
//! ```
//!
//! Every installed version lives in its own directory; "which version is
//! active" is answered only by resolving the stable symlink, never by a
//! separate pointer file. Running processes advertise the version they depend
//! on through per-PID lock files so cleanup can prove a version is unused
//! before deleting it.
//!
//! # Core Modules
//!
//! - [`updater`] - the orchestrator composing check/download/apply
//! - [`manifest`] - release manifest fetching, validation, and caching
//! - [`state`] - the persisted update-state document
//! - [`download`] - artifact streaming with progress reporting
//! - [`verify`] - SHA-256 checksum verification
//! - [`locks`] - per-process version locks and stale-lock healing
//! - [`install`] - extraction, activation, cleanup, and rollback
//! - [`platform`] - OS/arch/libc to platform-key resolution
//!
//! # Supporting Modules
//!
//! - [`layout`] - every well-known path under the state root
//! - [`host`] - host-environment and process-spawning capabilities
//! - [`version`] - dotted numeric version comparison
//! - [`cli`] - the `outpost update` command surface
//!
//! # Observability
//!
//! The library logs through the [`tracing`] facade and never installs a
//! subscriber itself. Without one, every event is a no-op; behavior does not
//! change, only visibility.

// Core functionality modules
pub mod constants;
pub mod core;
pub mod updater;

// Update pipeline
pub mod download;
pub mod install;
pub mod locks;
pub mod manifest;
pub mod state;
pub mod verify;

// Supporting modules
pub mod cli;
pub mod host;
pub mod layout;
pub mod platform;
pub mod version;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
