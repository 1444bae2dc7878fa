//! Termination protocol: SIGTERM, bounded wait, SIGKILL.

use crate::config::SupervisorConfig;
use crate::process::{Liveness, ProcessHandle};
use std::process::ExitStatus;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// How a stopped process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The process had already exited on its own.
    AlreadyExited(Option<ExitStatus>),

    /// The process exited within the graceful-stop window.
    Graceful(Option<ExitStatus>),

    /// The process ignored the graceful stop and was killed.
    Killed(Option<ExitStatus>),

    /// The process was killed but had not been reaped within the kill bound.
    Unresponsive,
}

impl Termination {
    /// Whether a forced kill was needed.
    pub fn was_forced(&self) -> bool {
        matches!(self, Termination::Killed(_) | Termination::Unresponsive)
    }
}

/// Stop `handle` and release its resources.
///
/// Never fails: a process that does not exit gracefully is escalated to a
/// kill, and the whole call is bounded by the stop timeout plus the kill
/// timeout plus the drain timeout.
pub async fn terminate(handle: &ProcessHandle, config: &SupervisorConfig) -> Termination {
    let outcome = match handle.liveness() {
        Liveness::Exited(status) => {
            debug!(
                "Process for stream '{}' (PID {}) already exited",
                handle.stream_name(),
                handle.pid()
            );
            Termination::AlreadyExited(status)
        }
        Liveness::Alive => stop_running(handle, config).await,
    };

    release(handle, config.drain_timeout()).await;
    outcome
}

async fn stop_running(handle: &ProcessHandle, config: &SupervisorConfig) -> Termination {
    warn!(
        "Terminating FFmpeg process for stream ID {} (PID: {})",
        handle.stream_id(),
        handle.pid()
    );

    if let Err(e) = handle.request_terminate() {
        warn!("Failed to send SIGTERM to PID {}: {}", handle.pid(), e);
    } else if let Some(status) =
        wait_for_exit(handle, config.stop_timeout(), config.poll_interval()).await
    {
        info!("Process {} exited gracefully", handle.pid());
        return Termination::Graceful(status);
    }

    error!(
        "FFmpeg process {} did not terminate gracefully, killing.",
        handle.pid()
    );
    if let Err(e) = handle.force_kill() {
        error!("Failed to kill PID {}: {}", handle.pid(), e);
    }

    match wait_for_exit(handle, config.kill_timeout(), config.poll_interval()).await {
        Some(status) => Termination::Killed(status),
        None => {
            error!(
                "FFmpeg process {} still running {:?} after SIGKILL",
                handle.pid(),
                config.kill_timeout()
            );
            Termination::Unresponsive
        }
    }
}

/// Poll until the process exits or `timeout` elapses.
///
/// Returns `Some(status)` on exit, `None` on timeout.
async fn wait_for_exit(
    handle: &ProcessHandle,
    timeout: Duration,
    poll: Duration,
) -> Option<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Liveness::Exited(status) = handle.liveness() {
            return Some(status);
        }
        let now = Instant::now();
        if now >= deadline {
            return None;
        }
        tokio::time::sleep(poll.min(deadline - now)).await;
    }
}

/// Close the primary output and join the log drainer.
async fn release(handle: &ProcessHandle, drain_timeout: Duration) {
    drop(handle.take_stdout());

    let Some(mut drainer) = handle.take_drainer() else {
        return;
    };

    match tokio::time::timeout(drain_timeout, &mut drainer).await {
        Ok(Ok(lines)) => debug!(
            "Log drainer for '{}' joined ({} lines)",
            handle.stream_name(),
            lines
        ),
        Ok(Err(e)) => warn!("Log drainer for '{}' failed: {}", handle.stream_name(), e),
        Err(_) => {
            // stderr is still held open, typically by an orphaned grandchild.
            warn!(
                "Log drainer for '{}' still open after {:?}, aborting",
                handle.stream_name(),
                drain_timeout
            );
            drainer.abort();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::stream::StreamId;
    use std::process::Stdio;
    use tokio::process::Command;

    fn fast_config() -> SupervisorConfig {
        SupervisorConfig {
            stop_timeout_ms: 300,
            kill_timeout_ms: 2_000,
            poll_interval_ms: 20,
            drain_timeout_ms: 500,
            ..Default::default()
        }
    }

    fn spawn(script: &str) -> ProcessHandle {
        let child = Command::new("sh")
            .arg("-c")
            .arg(script)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .expect("Failed to spawn process");
        ProcessHandle::new(StreamId::new(1), "test".to_string(), child).unwrap()
    }

    #[tokio::test]
    async fn test_graceful_termination() {
        let handle = spawn("exec sleep 30");

        let outcome = terminate(&handle, &fast_config()).await;

        assert!(matches!(outcome, Termination::Graceful(_)));
        assert!(!outcome.was_forced());
        assert!(!handle.is_alive());
    }

    #[tokio::test]
    async fn test_already_exited() {
        let handle = spawn("exit 0");
        while handle.is_alive() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let outcome = terminate(&handle, &fast_config()).await;
        assert!(matches!(outcome, Termination::AlreadyExited(Some(_))));
    }

    #[tokio::test]
    async fn test_wait_for_exit_times_out() {
        let handle = spawn("exec sleep 30");

        let waited = wait_for_exit(&handle, Duration::from_millis(50), Duration::from_millis(10)).await;
        assert!(waited.is_none());

        handle.force_kill().unwrap();
    }
}
