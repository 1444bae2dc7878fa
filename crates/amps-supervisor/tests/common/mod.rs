//! Shared helpers for supervisor integration tests.

#![allow(dead_code)]

use amps_supervisor::{
    LogSink, Profile, ProcessLauncher, Result, StreamConfig, Supervisor, SupervisorConfig,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::mpsc;

/// Source prefix that makes [`ShellLauncher`] run a program that does not exist.
pub const MISSING_PREFIX: &str = "missing:";

/// Runs each stream's source as a `sh -c` script and counts launches.
#[derive(Debug, Default)]
pub struct ShellLauncher {
    launches: AtomicUsize,
}

impl ShellLauncher {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

impl ProcessLauncher for ShellLauncher {
    fn command(&self, stream: &StreamConfig, _profile: &Profile) -> Result<Command> {
        self.launches.fetch_add(1, Ordering::SeqCst);

        if stream.source.starts_with(MISSING_PREFIX) {
            return Ok(Command::new("/nonexistent/amps-test-transcoder"));
        }

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&stream.source);
        Ok(cmd)
    }
}

/// Sends every drained line to a channel.
#[derive(Debug)]
pub struct ChannelSink(mpsc::UnboundedSender<(String, String)>);

impl ChannelSink {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<(String, String)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self(tx)), rx)
    }
}

impl LogSink for ChannelSink {
    fn line(&self, stream_name: &str, line: &str) {
        let _ = self.0.send((stream_name.to_string(), line.to_string()));
    }
}

/// Short timeouts so the kill path is exercised quickly.
pub fn fast_config() -> SupervisorConfig {
    SupervisorConfig {
        stop_timeout_ms: 300,
        kill_timeout_ms: 2_000,
        poll_interval_ms: 20,
        drain_timeout_ms: 500,
        ..Default::default()
    }
}

pub struct Harness {
    pub supervisor: Arc<Supervisor>,
    pub launcher: Arc<ShellLauncher>,
    pub lines: mpsc::UnboundedReceiver<(String, String)>,
}

pub fn harness() -> Harness {
    init_logging();

    let launcher = Arc::new(ShellLauncher::default());
    let (sink, lines) = ChannelSink::new();
    let supervisor = Supervisor::with_launcher(fast_config(), launcher.clone()).with_sink(sink);

    Harness {
        supervisor: Arc::new(supervisor),
        launcher,
        lines,
    }
}

pub fn stream(id: u64, script: &str) -> StreamConfig {
    StreamConfig::new(id, format!("stream-{}", id), script)
}

/// Wait for a drained line equal to `expected`.
pub async fn wait_for_line(
    lines: &mut mpsc::UnboundedReceiver<(String, String)>,
    expected: &str,
) -> String {
    tokio::time::timeout(Duration::from_secs(5), async {
        while let Some((name, line)) = lines.recv().await {
            if line == expected {
                return name;
            }
        }
        panic!("log channel closed before '{}'", expected);
    })
    .await
    .expect("timed out waiting for log line")
}

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("amps_supervisor=debug")
        .with_test_writer()
        .try_init();
}
