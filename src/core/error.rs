//! Error handling for the Outpost updater.
//!
//! The updater distinguishes two failure classes. Anything that could leave
//! the installation half-updated is a hard error and propagates: schema
//! violations in the manifest, a missing platform artifact, a checksum
//! mismatch, extraction or activation failures. Purely diagnostic failures
//! (cache writes, state persistence, stale-lock cleanup) degrade to a log
//! line at their call sites and never surface here.
//!
//! Typed failures live in [`UpdateError`]; operations return
//! [`anyhow::Result`] and attach context at their boundaries, so callers can
//! both match on the variant via [`anyhow::Error::downcast_ref`] and print a
//! readable chain.

use thiserror::Error;

/// The main error type for update operations.
#[derive(Error, Debug)]
pub enum UpdateError {
    /// This OS/architecture combination has no published artifacts.
    #[error("unsupported platform: {os}/{arch}")]
    UnsupportedPlatform {
        /// Operating system reported by the running binary
        os: String,
        /// CPU architecture reported by the running binary
        arch: String,
    },

    /// An HTTP request completed with a non-success status.
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// Status code of the response
        status: u16,
        /// The URL that was requested
        url: String,
    },

    /// The release manifest failed schema validation.
    ///
    /// A manifest that cannot be trusted in full is rejected in full; the
    /// updater never proceeds with a partially valid release description.
    #[error("invalid release manifest: {reason}")]
    ManifestInvalid {
        /// What the validator rejected
        reason: String,
    },

    /// The manifest has no artifact entry for this machine's platform key.
    #[error("release {version} has no artifact for platform '{platform}'")]
    PlatformArtifactMissing {
        /// Platform key resolved for this machine
        platform: String,
        /// Release version that was being downloaded
        version: String,
    },

    /// Neither the live manifest nor the cached one still advertises the
    /// requested version.
    #[error("version {version} is no longer advertised by the release manifest")]
    ManifestDrift {
        /// The version that was requested for download
        version: String,
    },

    /// A downloaded artifact hashed differently than the manifest declared.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// SHA-256 the manifest declared
        expected: String,
        /// SHA-256 the downloaded bytes actually hash to
        actual: String,
    },

    /// The artifact endpoint returned a success status with no body.
    #[error("empty response body from {url}")]
    EmptyDownload {
        /// The artifact URL
        url: String,
    },

    /// The external tar process exited non-zero while extracting an archive.
    #[error("failed to extract {archive} ({status}): {stderr}")]
    ExtractionFailed {
        /// Path of the archive being extracted
        archive: String,
        /// Exit status of the tar process
        status: String,
        /// Captured stderr of the tar process
        stderr: String,
    },

    /// An installed version directory is missing the product binary.
    #[error("version {version} is missing its binary at {path}")]
    BinaryMissing {
        /// The version whose binary was expected
        version: String,
        /// Path where the binary should have been
        path: String,
    },

    /// I/O error from the standard library
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
