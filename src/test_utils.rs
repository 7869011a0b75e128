//! Deterministic test doubles for the host capabilities.
//!
//! Available to unit tests and, behind the `test-utils` feature, to
//! integration tests and downstream crates.

use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::host::{HostEnv, Spawner};

/// [`HostEnv`] with a fixed pid, a canned environment, and an explicit set
/// of "alive" pids.
#[derive(Debug, Clone)]
pub struct FakeHost {
    pid: u32,
    env: HashMap<String, String>,
    alive: HashSet<u32>,
}

impl FakeHost {
    /// A host whose own pid is alive and whose environment is empty.
    pub fn new(pid: u32) -> Self {
        Self {
            pid,
            env: HashMap::new(),
            alive: HashSet::from([pid]),
        }
    }

    pub fn with_env(mut self, name: &str, value: &str) -> Self {
        self.env.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_alive(mut self, pid: u32) -> Self {
        self.alive.insert(pid);
        self
    }
}

impl HostEnv for FakeHost {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn env_var(&self, name: &str) -> Option<String> {
        self.env.get(name).cloned()
    }

    fn process_alive(&self, pid: u32) -> bool {
        self.alive.contains(&pid)
    }
}

/// [`Spawner`] that records every spawn instead of creating processes.
#[derive(Debug, Default)]
pub struct RecordingSpawner {
    calls: Arc<Mutex<Vec<Vec<String>>>>,
}

impl RecordingSpawner {
    /// Handle onto the recorded calls, usable after the spawner is moved.
    pub fn calls(&self) -> Arc<Mutex<Vec<Vec<String>>>> {
        self.calls.clone()
    }
}

impl Spawner for RecordingSpawner {
    fn spawn_detached(&self, args: &[String]) -> Result<()> {
        self.calls.lock().unwrap().push(args.to_vec());
        Ok(())
    }
}
