//! The stream supervisor.
//!
//! [`Supervisor`] keeps at most one live transcoder process per stream:
//!
//! - [`acquire`](Supervisor::acquire) reuses the stream's live process or
//!   launches a new one together with its log drainer.
//! - [`stop`](Supervisor::stop) detaches the stream's process and runs the
//!   termination protocol on it.
//! - [`shutdown_all`](Supervisor::shutdown_all) stops every stream, once.
//!
//! All three serialize on the per-stream guard from the [`StreamRegistry`],
//! so work on unrelated streams proceeds in parallel.
//!
//! A handle returned by `acquire` stays usable after a concurrent `stop`
//! detaches it. The caller then holds a process the registry no longer
//! tracks, which ends as soon as the termination protocol finishes.

use crate::config::SupervisorConfig;
use crate::drain::{spawn_drainer, LogSink, TracingSink};
use crate::error::{Result, SupervisorError};
use crate::launcher::{FfmpegLauncher, ProcessLauncher};
use crate::process::{Liveness, ProcessHandle, ProcessInfo};
use crate::registry::StreamRegistry;
use crate::stream::{Profile, StreamConfig, StreamId};
use crate::terminate::{terminate, Termination};
use futures::future::join_all;
use serde::Serialize;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

/// Outcome of [`Supervisor::shutdown_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Streams the sweep visited.
    pub streams: usize,
    /// Processes that exited within the graceful window.
    pub graceful: usize,
    /// Processes that had to be killed.
    pub killed: usize,
    /// Processes that had already exited.
    pub already_exited: usize,
}

impl ShutdownReport {
    fn record(&mut self, outcome: Option<Termination>) {
        match outcome {
            None => {}
            Some(Termination::AlreadyExited(_)) => self.already_exited += 1,
            Some(Termination::Graceful(_)) => self.graceful += 1,
            Some(Termination::Killed(_) | Termination::Unresponsive) => self.killed += 1,
        }
    }
}

/// Owns the lifecycle of every transcoder process it starts.
#[derive(Debug)]
pub struct Supervisor {
    registry: StreamRegistry,
    launcher: Arc<dyn ProcessLauncher>,
    sink: Arc<dyn LogSink>,
    config: SupervisorConfig,
    shutting_down: AtomicBool,
    shutdown: OnceCell<ShutdownReport>,
}

impl Supervisor {
    /// Supervisor launching ffmpeg and logging through `tracing`.
    pub fn new(config: SupervisorConfig) -> Self {
        let launcher = Arc::new(FfmpegLauncher::from_config(&config));
        Self::with_launcher(config, launcher)
    }

    /// Supervisor with a custom launcher.
    pub fn with_launcher(config: SupervisorConfig, launcher: Arc<dyn ProcessLauncher>) -> Self {
        Self {
            registry: StreamRegistry::new(),
            launcher,
            sink: Arc::new(TracingSink),
            config,
            shutting_down: AtomicBool::new(false),
            shutdown: OnceCell::new(),
        }
    }

    /// Replace the sink drained diagnostic lines go to.
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Configuration in use.
    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// The registry of stream guards.
    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    /// Whether [`shutdown_all`](Self::shutdown_all) has started.
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Return the stream's live process, launching one if needed.
    ///
    /// Concurrent calls for the same stream launch at most one process; the
    /// others wait on the stream's guard and reuse it. A process that exited
    /// on its own is replaced. Launch failures leave nothing in the registry.
    pub async fn acquire(&self, stream: &StreamConfig, profile: &Profile) -> Result<ProcessHandle> {
        if self.is_shutting_down() {
            return Err(SupervisorError::ShutDown);
        }

        let name = stream.display_name();
        let guard = self.registry.guard(stream.id);
        let mut entry = guard.lock().await;

        // Checked again under the guard so nothing launches behind the sweep.
        if self.is_shutting_down() {
            return Err(SupervisorError::ShutDown);
        }

        if let Some(current) = entry.read() {
            match current.liveness() {
                Liveness::Alive => {
                    debug!(
                        "Returning existing FFmpeg process for stream '{}' (PID: {})",
                        name,
                        current.pid()
                    );
                    return Ok(current.clone());
                }
                Liveness::Exited(status) => {
                    info!(
                        "FFmpeg process for stream '{}' (PID: {}) exited with {:?}, relaunching",
                        name,
                        current.pid(),
                        status
                    );
                }
            }
            entry.remove();
        }

        info!("Starting new FFmpeg process for stream '{}'", name);
        let handle = match self.launch(stream, profile, &name) {
            Ok(handle) => handle,
            Err(e) => {
                error!("Failed to start FFmpeg for stream '{}': {}", name, e);
                return Err(e);
            }
        };

        info!(
            "FFmpeg process started for '{}' with PID: {}",
            name,
            handle.pid()
        );
        entry.write(handle.clone());
        Ok(handle)
    }

    fn launch(&self, stream: &StreamConfig, profile: &Profile, name: &str) -> Result<ProcessHandle> {
        if stream.source.trim().is_empty() {
            return Err(SupervisorError::InvalidSource {
                id: stream.id,
                name: name.to_string(),
            });
        }

        let mut cmd = self.launcher.command(stream, profile)?;
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| SupervisorError::LaunchFailed {
            id: stream.id,
            name: name.to_string(),
            source,
        })?;

        let stderr = child.stderr.take();
        let handle = ProcessHandle::new(stream.id, name.to_string(), child)?;
        if let Some(stderr) = stderr {
            handle.attach_drainer(spawn_drainer(name.to_string(), stderr, Arc::clone(&self.sink)));
        }
        Ok(handle)
    }

    /// Stop the stream's process, if it has one.
    ///
    /// Idempotent: returns `None` when nothing was registered. Never fails; a
    /// process ignoring the graceful stop is killed.
    pub async fn stop(&self, id: StreamId) -> Option<Termination> {
        let guard = self.registry.existing_guard(id)?;
        let mut entry = guard.lock().await;
        let handle = entry.remove()?;

        // The guard stays held until the process is gone, so a concurrent
        // acquire for this stream starts fresh only after teardown.
        let outcome = terminate(&handle, &self.config).await;
        if !matches!(outcome, Termination::AlreadyExited(_)) {
            info!("Process for stream ID {} stopped.", id);
        }
        Some(outcome)
    }

    /// Stop every stream. Runs exactly once; concurrent and later callers wait
    /// for and receive the first sweep's report.
    pub async fn shutdown_all(&self) -> ShutdownReport {
        self.shutdown.get_or_init(|| self.sweep()).await.clone()
    }

    async fn sweep(&self) -> ShutdownReport {
        self.shutting_down.store(true, Ordering::Release);
        info!("Shutting down all active FFmpeg streams...");

        let ids = self.registry.stream_ids();
        let outcomes = join_all(ids.iter().map(|id| self.stop(*id))).await;

        let mut report = ShutdownReport {
            streams: ids.len(),
            ..Default::default()
        };
        for outcome in outcomes {
            report.record(outcome);
        }

        info!(
            "Cleanup complete ({} graceful, {} killed, {} already exited).",
            report.graceful, report.killed, report.already_exited
        );
        report
    }

    /// Status of the stream's process, if one is running.
    ///
    /// Never waits on the stream's guard. A stream whose guard is held by an
    /// in-flight acquire or stop reports no process, so status queries stay
    /// responsive while a stubborn process is being killed.
    pub fn status(&self, id: StreamId) -> Option<ProcessInfo> {
        self.registry
            .current(id)
            .filter(ProcessHandle::is_alive)
            .map(|handle| handle.info())
    }

    /// Streams whose current process is alive. Non-blocking, like
    /// [`status`](Self::status).
    pub fn active_streams(&self) -> Vec<StreamId> {
        self.registry
            .stream_ids()
            .into_iter()
            .filter(|id| self.status(*id).is_some())
            .collect()
    }
}
