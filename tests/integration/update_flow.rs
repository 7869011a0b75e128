//! End-to-end exercises of the check/download/apply pipeline.

use std::collections::HashMap;
use std::net::SocketAddr;

use outpost_cli::layout::Layout;
use outpost_cli::platform::resolve_platform;
use outpost_cli::state::CheckResult;
use outpost_cli::updater::{CheckOutcome, Updater};
use sha2::{Digest, Sha256};
use tempfile::TempDir;

use crate::http::{Canned, serve, serve_with};

fn manifest_json(
    version: &str,
    platform: &str,
    artifact_url: &str,
    sha256: &str,
    size: u64,
) -> String {
    serde_json::json!({
        "version": version,
        "releaseDate": "2026-08-01",
        "minRuntimeVersion": "1.0.0",
        "platforms": {
            platform: { "url": artifact_url, "sha256": sha256, "size": size }
        }
    })
    .to_string()
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn updater_at(tmp: &TempDir, current_version: &str, addr: SocketAddr) -> Updater {
    Updater::new(Layout::new(tmp.path()), current_version)
        .with_manifest_url(format!("http://{addr}/manifest.json"))
}

/// Responder serving a manifest for `version` plus its artifact, with the
/// artifact URL pointing back at the responder itself.
async fn serve_release(version: &str, platform: &str, artifact: Vec<u8>, sha256: &str) -> SocketAddr {
    let manifest_version = version.to_string();
    let platform = platform.to_string();
    let sha256 = sha256.to_string();
    serve_with(move |addr| {
        HashMap::from([
            (
                "/manifest.json".to_string(),
                Canned::ok(manifest_json(
                    &manifest_version,
                    &platform,
                    &format!("http://{addr}/artifact.tar.gz"),
                    &sha256,
                    artifact.len() as u64,
                )),
            ),
            ("/artifact.tar.gz".to_string(), Canned::ok(artifact)),
        ])
    })
    .await
}

#[tokio::test]
async fn check_reports_update_available_and_persists_state() {
    let tmp = TempDir::new().unwrap();
    let manifest = manifest_json(
        "2.3.0",
        "linux-x64-gnu",
        "https://dl.example/a.tar.gz",
        &"a".repeat(64),
        10,
    );
    let addr = serve(HashMap::from([("/manifest.json".to_string(), Canned::ok(manifest))])).await;
    let mut updater = updater_at(&tmp, "2.2.9", addr);

    let outcome = updater.check().await;
    assert_eq!(
        outcome,
        CheckOutcome::UpdateAvailable {
            current: "2.2.9".into(),
            latest: "2.3.0".into(),
        }
    );

    let state = updater.state();
    assert_eq!(state.last_check_result, CheckResult::UpdateAvailable);
    assert_eq!(state.available_version.as_deref(), Some("2.3.0"));
    assert!(state.last_check_time > 0);

    // Both the state document and the manifest cache landed on disk.
    assert!(tmp.path().join("update-state.json").exists());
    assert!(tmp.path().join("manifest.json").exists());
}

#[tokio::test]
async fn check_with_equal_versions_is_up_to_date() {
    let tmp = TempDir::new().unwrap();
    let manifest = manifest_json(
        "2.3.0",
        "linux-x64-gnu",
        "https://dl.example/a.tar.gz",
        &"a".repeat(64),
        10,
    );
    let addr = serve(HashMap::from([("/manifest.json".to_string(), Canned::ok(manifest))])).await;
    let mut updater = updater_at(&tmp, "2.3.0", addr);

    let outcome = updater.check().await;
    assert_eq!(
        outcome,
        CheckOutcome::UpToDate {
            current: "2.3.0".into()
        }
    );
    assert_eq!(updater.state().last_check_result, CheckResult::UpToDate);
    assert!(updater.state().available_version.is_none());
}

#[tokio::test]
async fn failed_check_is_captured_as_a_result_not_an_error() {
    let tmp = TempDir::new().unwrap();
    let addr = serve(HashMap::from([(
        "/manifest.json".to_string(),
        Canned::error(500),
    )]))
    .await;
    let mut updater = updater_at(&tmp, "1.0.0", addr);

    let outcome = updater.check().await;
    assert!(matches!(outcome, CheckOutcome::Failed { .. }));
    assert_eq!(updater.state().last_check_result, CheckResult::Error);
    assert!(updater.state().last_check_time > 0);
    // Prior fields survive a failed check.
    assert!(updater.state().available_version.is_none());
    assert!(updater.state().pending_update.is_none());
}

#[tokio::test]
async fn schema_violations_fail_the_check() {
    let tmp = TempDir::new().unwrap();
    // sha256 is too short.
    let manifest = manifest_json(
        "2.3.0",
        "linux-x64-gnu",
        "https://dl.example/a.tar.gz",
        "abc123",
        10,
    );
    let addr = serve(HashMap::from([("/manifest.json".to_string(), Canned::ok(manifest))])).await;
    let mut updater = updater_at(&tmp, "1.0.0", addr);

    let outcome = updater.check().await;
    assert!(matches!(outcome, CheckOutcome::Failed { .. }));
}

#[tokio::test]
async fn download_rejects_a_checksum_mismatch_and_records_no_pending_update() {
    let tmp = TempDir::new().unwrap();
    let platform = resolve_platform().await.unwrap();
    let artifact = b"definitely not what the manifest promised".to_vec();

    // The manifest lies about the artifact's hash.
    let addr = serve_release("2.3.0", &platform, artifact, &"0".repeat(64)).await;
    let mut updater = updater_at(&tmp, "1.0.0", addr);

    let error = updater.download("2.3.0", None).await.unwrap_err();
    assert!(format!("{error:#}").contains("checksum mismatch"));
    assert!(updater.state().pending_update.is_none());

    // The mismatching temp file was deleted.
    let leftovers = std::fs::read_dir(tmp.path().join("downloads"))
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn download_falls_back_to_the_cached_manifest_on_drift() {
    let tmp = TempDir::new().unwrap();
    let platform = resolve_platform().await.unwrap();
    let artifact = b"cached release artifact".to_vec();
    let sha = sha256_hex(&artifact);

    // A check against the 2.3.0 release caches its manifest.
    let old_addr = serve_release("2.3.0", &platform, artifact, &sha).await;
    let mut checker = updater_at(&tmp, "1.0.0", old_addr);
    assert!(matches!(
        checker.check().await,
        CheckOutcome::UpdateAvailable { .. }
    ));

    // By download time the endpoint has moved on to 2.4.0. The cached
    // manifest still knows where 2.3.0 lives (on the old responder).
    let new_manifest = manifest_json(
        "2.4.0",
        &platform,
        "https://dl.example/next.tar.gz",
        &"b".repeat(64),
        10,
    );
    let new_addr = serve(HashMap::from([(
        "/manifest.json".to_string(),
        Canned::ok(new_manifest),
    )]))
    .await;
    let mut updater = updater_at(&tmp, "1.0.0", new_addr);

    updater.download("2.3.0", None).await.unwrap();
    let pending = updater.state().pending_update.clone().unwrap();
    assert_eq!(pending.version, "2.3.0");
    assert!(pending.verified);
}

#[tokio::test]
async fn download_fails_on_manifest_drift() {
    let tmp = TempDir::new().unwrap();
    let platform = resolve_platform().await.unwrap();
    let artifact = b"artifact".to_vec();
    let sha = sha256_hex(&artifact);

    // Live manifest advertises 3.0.0; 2.9.0 was requested and there is no
    // cached manifest to fall back to.
    let addr = serve_release("3.0.0", &platform, artifact, &sha).await;
    let mut updater = updater_at(&tmp, "1.0.0", addr);

    let error = updater.download("2.9.0", None).await.unwrap_err();
    assert!(format!("{error:#}").contains("no longer advertised"));
    assert!(updater.state().pending_update.is_none());
}

#[cfg(unix)]
#[tokio::test]
async fn full_flow_checks_downloads_applies_and_activates() {
    let tmp = TempDir::new().unwrap();
    let platform = resolve_platform().await.unwrap();

    // Build a genuine artifact: a tarball containing the product binary.
    let staging = tmp.path().join("staging");
    std::fs::create_dir_all(&staging).unwrap();
    std::fs::write(staging.join("outpost"), "#!/bin/sh\necho outpost 1.1.0\n").unwrap();
    let tarball_path = tmp.path().join("artifact.tar.gz");
    let status = tokio::process::Command::new("tar")
        .arg("-czf")
        .arg(&tarball_path)
        .arg("-C")
        .arg(&staging)
        .arg("outpost")
        .status()
        .await
        .unwrap();
    assert!(status.success());
    let artifact = std::fs::read(&tarball_path).unwrap();
    let sha = sha256_hex(&artifact);

    let addr = serve_release("1.1.0", &platform, artifact, &sha).await;
    let mut updater = updater_at(&tmp, "1.0.0", addr);

    // Check sees the new release.
    let outcome = updater.check().await;
    assert_eq!(
        outcome,
        CheckOutcome::UpdateAvailable {
            current: "1.0.0".into(),
            latest: "1.1.0".into(),
        }
    );

    // Download verifies and records the pending update.
    let downloaded = updater.download("1.1.0", None).await.unwrap();
    assert!(downloaded.exists());
    let pending = updater.state().pending_update.clone().unwrap();
    assert_eq!(pending.version, "1.1.0");
    assert!(pending.verified);

    // Apply installs, activates, and rolls the state forward.
    assert!(updater.apply(false).await.unwrap());
    let layout = Layout::new(tmp.path());
    assert_eq!(layout.active_version().as_deref(), Some("1.1.0"));
    assert!(layout.version_binary("1.1.0").exists());

    let state = updater.state();
    assert_eq!(state.current_version, "1.1.0");
    assert!(state.pending_update.is_none());
    assert!(state.available_version.is_none());
    assert_eq!(state.last_check_result, CheckResult::UpToDate);

    // The consumed artifact was pruned from downloads/.
    let leftovers = std::fs::read_dir(tmp.path().join("downloads"))
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftovers, 0);

    // Re-applying is a routine no-op.
    assert!(!updater.apply(false).await.unwrap());
}

#[tokio::test]
async fn download_reports_monotonic_progress() {
    let tmp = TempDir::new().unwrap();
    let platform = resolve_platform().await.unwrap();
    let artifact: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    let sha = sha256_hex(&artifact);

    let addr = serve_release("1.2.0", &platform, artifact, &sha).await;
    let mut updater = updater_at(&tmp, "1.0.0", addr);

    let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::<u8>::new()));
    let sink = seen.clone();
    updater
        .download(
            "1.2.0",
            Some(Box::new(move |pct| sink.lock().unwrap().push(pct))),
        )
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    assert!(!seen.is_empty());
    assert_eq!(*seen.last().unwrap(), 100);
    // Strictly increasing, so no duplicates and no regressions.
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
}
