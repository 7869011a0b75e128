//! Artifact checksum verification.
//!
//! A checksum mismatch is a normal, reportable outcome of downloading over a
//! network, so [`ChecksumVerifier::verify_checksum`] returns it as data
//! rather than an error. Failing to read the file at all stays an error.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

/// Result of comparing a file against an expected digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumOutcome {
    /// Whether the computed digest matched the expected one
    pub valid: bool,
    /// The digest the file actually hashes to, hex encoded
    pub actual: String,
}

/// Computes and compares SHA-256 digests.
pub struct ChecksumVerifier;

impl ChecksumVerifier {
    /// Compute the hex SHA-256 digest of a file.
    pub async fn compute_sha256(file_path: &Path) -> Result<String> {
        debug!(path = %file_path.display(), "computing sha256");
        let contents = fs::read(file_path)
            .await
            .with_context(|| format!("failed to read {}", file_path.display()))?;

        let mut hasher = Sha256::new();
        hasher.update(&contents);
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Compare a file against an expected hex digest.
    ///
    /// Comparison is case-insensitive since published checksums come in both
    /// cases. A mismatch is reported in the outcome, never raised.
    pub async fn verify_checksum(file_path: &Path, expected: &str) -> Result<ChecksumOutcome> {
        let actual = Self::compute_sha256(file_path).await?;
        let valid = actual.eq_ignore_ascii_case(expected.trim());
        if !valid {
            warn!(
                path = %file_path.display(),
                expected,
                actual = %actual,
                "checksum mismatch"
            );
        }
        Ok(ChecksumOutcome { valid, actual })
    }
}
