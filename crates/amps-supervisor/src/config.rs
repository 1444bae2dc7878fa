//! Supervisor configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default graceful-stop window before a process is killed.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Tunables for launching and stopping transcoder processes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Transcoder executable. Resolved on `PATH` when unset.
    pub ffmpeg_binary: Option<PathBuf>,

    /// Arguments placed before `-i <source>`.
    pub input_args: Vec<String>,

    /// Output target, the process's stdout by default.
    pub output_target: String,

    /// How long a process gets to honour SIGTERM.
    pub stop_timeout_ms: u64,

    /// How long to wait for the exit after SIGKILL.
    pub kill_timeout_ms: u64,

    /// Liveness poll interval while waiting for an exit.
    pub poll_interval_ms: u64,

    /// How long stop waits for the log drainer to see end-of-stream.
    pub drain_timeout_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            ffmpeg_binary: None,
            input_args: Vec::new(),
            output_target: "pipe:1".to_string(),
            stop_timeout_ms: DEFAULT_STOP_TIMEOUT.as_millis() as u64,
            kill_timeout_ms: 2_000,
            poll_interval_ms: 100,
            drain_timeout_ms: 1_000,
        }
    }
}

impl SupervisorConfig {
    /// Graceful-stop window.
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Post-kill wait bound.
    pub fn kill_timeout(&self) -> Duration {
        Duration::from_millis(self.kill_timeout_ms)
    }

    /// Poll interval, never zero.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Drainer join bound.
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}
