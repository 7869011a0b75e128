//! Host-environment capabilities.
//!
//! The lock manager and state store need three ambient facts about the host:
//! the current process id, environment variable values, and whether an
//! arbitrary pid is alive. Reading those directly from the OS scattered
//! through the code makes the lock and state logic untestable, so they are
//! grouped behind [`HostEnv`] and injected. Production code uses
//! [`RealHost`]; tests substitute a deterministic fake.
//!
//! Detached re-invocation of the updater's own executable (for background
//! checks that must not block a foreground command) goes through the
//! [`Spawner`] capability for the same reason.

use anyhow::{Context, Result};
use std::process::Stdio;

/// Ambient facts about the host process and OS.
pub trait HostEnv: Send + Sync {
    /// Process id of the current process.
    fn pid(&self) -> u32;

    /// Look up an environment variable, `None` when unset or not UTF-8.
    fn env_var(&self, name: &str) -> Option<String>;

    /// Non-destructive liveness probe for an arbitrary pid.
    fn process_alive(&self, pid: u32) -> bool;
}

/// [`HostEnv`] backed by the real OS.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealHost;

impl HostEnv for RealHost {
    fn pid(&self) -> u32 {
        std::process::id()
    }

    fn env_var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn process_alive(&self, pid: u32) -> bool {
        is_pid_alive(pid)
    }
}

/// Check whether a given pid is alive.
///
/// Uses `kill(pid, 0)`, which checks for process existence without sending a
/// signal. EPERM means the process exists under different privileges and is
/// treated as alive; ESRCH (or any other failure) means dead.
fn is_pid_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    let Ok(pid_i32) = i32::try_from(pid) else {
        return false;
    };
    #[cfg(unix)]
    {
        // SAFETY: kill with signal 0 only checks for process existence.
        let result = unsafe { libc::kill(pid_i32, 0) };
        if result == 0 {
            return true;
        }
        let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
        errno == libc::EPERM
    }
    #[cfg(not(unix))]
    {
        // No cheap non-destructive probe on this platform; assume alive so
        // cleanup stays conservative.
        let _ = pid_i32;
        true
    }
}

/// Fire-and-forget process spawning.
pub trait Spawner: Send + Sync {
    /// Spawn a detached instance of the current executable with the given
    /// arguments. The child is not awaited and its result is never observed.
    fn spawn_detached(&self, args: &[String]) -> Result<()>;
}

/// [`Spawner`] that re-invokes the running executable with null stdio.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessSpawner;

impl Spawner for ProcessSpawner {
    fn spawn_detached(&self, args: &[String]) -> Result<()> {
        let exe = std::env::current_exe().context("could not resolve current executable")?;
        std::process::Command::new(exe)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .context("failed to spawn detached process")?;
        Ok(())
    }
}
