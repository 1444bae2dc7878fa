//! Handles to running transcoder processes.
//!
//! A [`ProcessHandle`] is cheap to clone. The registry keeps one clone as the
//! stream's current process and callers of `acquire` get others. Dropping a
//! handle from the registry does not invalidate the clones callers hold: the
//! process keeps running until it exits or is terminated by `stop`.

use crate::stream::StreamId;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::{Child, ChildStdout};
use tokio::task::JoinHandle;
use tracing::debug;

/// Result of a non-blocking liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// The process has not exited yet.
    Alive,

    /// The process has exited. The status is `None` when the OS could not
    /// report it.
    Exited(Option<ExitStatus>),
}

/// Shared handle to a supervised process.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    stream_id: StreamId,
    stream_name: String,
    pid: u32,
    started_at: DateTime<Utc>,
    spawned: Instant,
    child: Mutex<Child>,
    stdout: Mutex<Option<ChildStdout>>,
    drainer: Mutex<Option<JoinHandle<usize>>>,
}

impl ProcessHandle {
    /// Wrap a freshly spawned child. The child's stderr must already have been
    /// taken for the log drainer; stdout stays available via [`take_stdout`].
    ///
    /// [`take_stdout`]: ProcessHandle::take_stdout
    pub(crate) fn new(
        stream_id: StreamId,
        stream_name: String,
        mut child: Child,
    ) -> std::io::Result<Self> {
        let pid = child
            .id()
            .ok_or_else(|| std::io::Error::other("spawned child did not report a PID"))?;
        let stdout = child.stdout.take();

        Ok(Self {
            inner: Arc::new(Inner {
                stream_id,
                stream_name,
                pid,
                started_at: Utc::now(),
                spawned: Instant::now(),
                child: Mutex::new(child),
                stdout: Mutex::new(stdout),
                drainer: Mutex::new(None),
            }),
        })
    }

    /// Stream this process belongs to.
    pub fn stream_id(&self) -> StreamId {
        self.inner.stream_id
    }

    /// Display name of the stream.
    pub fn stream_name(&self) -> &str {
        &self.inner.stream_name
    }

    /// OS process id.
    pub fn pid(&self) -> u32 {
        self.inner.pid
    }

    /// Wall-clock start time.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.started_at
    }

    /// Time since the process was spawned.
    pub fn uptime(&self) -> Duration {
        self.inner.spawned.elapsed()
    }

    /// Non-blocking check of whether the process has exited. Reaps the child
    /// when it has.
    pub fn liveness(&self) -> Liveness {
        let mut child = self.inner.child.lock();
        match child.try_wait() {
            Ok(None) => Liveness::Alive,
            Ok(Some(status)) => Liveness::Exited(Some(status)),
            Err(e) => {
                debug!("try_wait failed for PID {}: {}", self.inner.pid, e);
                Liveness::Exited(None)
            }
        }
    }

    /// Whether the process is still running.
    pub fn is_alive(&self) -> bool {
        self.liveness() == Liveness::Alive
    }

    /// Exit status, or `None` while the process is running (or when the
    /// status could not be collected).
    pub fn exit_status(&self) -> Option<ExitStatus> {
        match self.liveness() {
            Liveness::Alive => None,
            Liveness::Exited(status) => status,
        }
    }

    /// Claim the process's primary output. Returns `None` once claimed.
    pub fn take_stdout(&self) -> Option<ChildStdout> {
        self.inner.stdout.lock().take()
    }

    /// Whether two handles refer to the same launched process.
    pub fn same_process(&self, other: &ProcessHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Snapshot for status reporting.
    pub fn info(&self) -> ProcessInfo {
        ProcessInfo {
            stream_id: self.inner.stream_id,
            pid: self.inner.pid,
            started_at: self.inner.started_at,
            uptime_ms: self.uptime().as_millis() as u64,
        }
    }

    /// Ask the process to exit (SIGTERM on unix).
    ///
    /// The liveness check and the signal happen under the child lock, so an
    /// already reaped PID is never signalled.
    pub(crate) fn request_terminate(&self) -> std::io::Result<()> {
        let mut child = self.inner.child.lock();
        if child.try_wait()?.is_some() {
            return Ok(());
        }

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            match kill(Pid::from_raw(self.inner.pid as i32), Signal::SIGTERM) {
                Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
                Err(errno) => Err(std::io::Error::from(errno)),
            }
        }

        #[cfg(not(unix))]
        {
            child.start_kill()
        }
    }

    /// Forcibly kill the process (SIGKILL on unix). Already exited processes
    /// are left alone.
    pub(crate) fn force_kill(&self) -> std::io::Result<()> {
        let mut child = self.inner.child.lock();
        if child.try_wait()?.is_some() {
            return Ok(());
        }
        child.start_kill()
    }

    pub(crate) fn attach_drainer(&self, drainer: JoinHandle<usize>) {
        *self.inner.drainer.lock() = Some(drainer);
    }

    pub(crate) fn take_drainer(&self) -> Option<JoinHandle<usize>> {
        self.inner.drainer.lock().take()
    }
}

/// Serializable process status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    /// Stream identifier.
    pub stream_id: StreamId,
    /// OS process id.
    pub pid: u32,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// Uptime in milliseconds at the time of the snapshot.
    pub uptime_ms: u64,
}
