//! Global constants used throughout the Outpost updater.
//!
//! Timeout durations, default endpoints, retention counts, and environment
//! variable names used across multiple modules. Defining them centrally
//! improves maintainability and makes magic numbers more discoverable.

use std::time::Duration;

/// Default release manifest endpoint.
///
/// Overridable per-process through [`MANIFEST_URL_ENV`], which is how staging
/// channels and tests point the updater at a different release feed.
pub const DEFAULT_MANIFEST_URL: &str = "https://releases.outpost.sh/manifest.json";

/// Environment variable overriding the manifest endpoint.
pub const MANIFEST_URL_ENV: &str = "OUTPOST_MANIFEST_URL";

/// Environment variable overriding the automatic check interval, in
/// milliseconds.
pub const CHECK_INTERVAL_ENV: &str = "OUTPOST_CHECK_INTERVAL_MS";

/// Environment variable disabling automatic update checks entirely.
///
/// Truthy values are `1` and `true`.
pub const DISABLE_ENV: &str = "OUTPOST_UPDATE_DISABLED";

/// Default interval between automatic update checks (1 hour).
///
/// Long enough to keep the release endpoint out of the hot path of every
/// command, short enough that agents pick up a release the same day.
pub const DEFAULT_CHECK_INTERVAL_MS: u64 = 3_600_000;

/// Timeout for fetching the release manifest (15 seconds).
///
/// Manifest fetches sit on the interactive path of `outpost update`, so the
/// bound is deliberately tight. The request is aborted at the deadline.
pub const MANIFEST_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Timeout for downloading a release artifact (5 minutes).
///
/// Artifacts are tens of megabytes; this accommodates slow links while still
/// guaranteeing the download cannot hang forever.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Number of installed versions retained by cleanup.
///
/// Keeping a few versions around is what makes rollback possible after a bad
/// release, so this must never be 0.
pub const DEFAULT_KEEP_COUNT: usize = 3;

/// Name of the product binary inside each version directory.
pub const BINARY_NAME: &str = "outpost";

/// File name of the cached release manifest under the state root.
pub const MANIFEST_CACHE_FILE: &str = "manifest.json";

/// File name of the persisted update state under the state root.
pub const STATE_FILE: &str = "update-state.json";

/// Platform-specific file name of the product binary.
pub fn binary_file_name() -> String {
    if cfg!(windows) {
        format!("{BINARY_NAME}.exe")
    } else {
        BINARY_NAME.to_string()
    }
}
