//! Platform resolution for artifact selection.
//!
//! Release artifacts are published per platform key. The key is derived from
//! the OS and CPU architecture, plus the libc flavor on Linux, where gnu and
//! musl builds are not interchangeable. The libc flavor is probed at runtime
//! from the dynamic linker; a failed probe is non-fatal and defaults to gnu.

use anyhow::Result;
use tokio::process::Command;
use tracing::debug;

use crate::core::UpdateError;

/// Linux libc flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Libc {
    Gnu,
    Musl,
}

impl Libc {
    fn as_str(self) -> &'static str {
        match self {
            Self::Gnu => "gnu",
            Self::Musl => "musl",
        }
    }
}

/// Resolve the platform key for the running machine.
///
/// Keys follow the `<os>-<arch>[-<libc>]` scheme used by the release
/// pipeline: `linux-x64-gnu`, `linux-arm64-musl`, `darwin-arm64`,
/// `windows-x64`. Fails with [`UpdateError::UnsupportedPlatform`] outside
/// the three supported OS families.
pub async fn resolve_platform() -> Result<String> {
    let os = std::env::consts::OS;
    let libc = if os == "linux" { detect_libc().await } else { Libc::Gnu };
    platform_key(os, std::env::consts::ARCH, libc)
}

fn platform_key(os: &str, arch: &str, libc: Libc) -> Result<String> {
    let unsupported = || UpdateError::UnsupportedPlatform {
        os: os.to_string(),
        arch: arch.to_string(),
    };

    let arch = match arch {
        "x86_64" => "x64",
        "aarch64" => "arm64",
        _ => return Err(unsupported().into()),
    };

    match os {
        "linux" => Ok(format!("linux-{arch}-{}", libc.as_str())),
        "macos" => Ok(format!("darwin-{arch}")),
        "windows" => Ok(format!("windows-{arch}")),
        _ => Err(unsupported().into()),
    }
}

/// Probe the dynamic linker for a musl marker.
///
/// musl's `ldd` identifies itself in its version banner (on stderr). Any
/// probe failure defaults to gnu, the overwhelmingly common case.
async fn detect_libc() -> Libc {
    match Command::new("ldd").arg("--version").output().await {
        Ok(output) => {
            let banner = format!(
                "{}{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
            if banner.to_lowercase().contains("musl") {
                Libc::Musl
            } else {
                Libc::Gnu
            }
        }
        Err(error) => {
            debug!(%error, "libc probe failed, assuming gnu");
            Libc::Gnu
        }
    }
}
