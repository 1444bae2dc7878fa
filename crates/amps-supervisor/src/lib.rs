//! # AMPS stream supervisor
//!
//! Supervises long-running transcoder processes, one per stream definition.
//!
//! ## Features
//!
//! - **Start or reuse**: at most one live process per stream, even under
//!   concurrent callers
//! - **Bounded stop**: SIGTERM, a fixed grace period, then SIGKILL
//! - **Log draining**: every process's stderr is forwarded to `tracing`
//! - **Shutdown sweep**: one call stops everything the supervisor started
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use amps_supervisor::{Profile, StreamConfig, Supervisor, SupervisorConfig};
//!
//! #[tokio::main]
//! async fn main() -> amps_supervisor::Result<()> {
//!     let supervisor = Supervisor::new(SupervisorConfig::default());
//!
//!     let stream = StreamConfig::new(1u64, "lobby", "rtsp://camera.local/stream1");
//!     let profile = Profile::new()
//!         .with("f", "mpegts")
//!         .with("vcodec", "copy");
//!
//!     let handle = supervisor.acquire(&stream, &profile).await?;
//!     println!("ffmpeg running with PID {}", handle.pid());
//!
//!     supervisor.stop(stream.id).await;
//!     supervisor.shutdown_all().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod drain;
pub mod error;
pub mod launcher;
pub mod process;
pub mod registry;
pub mod stream;
pub mod supervisor;
pub mod terminate;

pub use config::SupervisorConfig;
pub use drain::{LogSink, TracingSink};
pub use error::{Result, SupervisorError};
pub use launcher::{FfmpegLauncher, ProcessLauncher};
pub use process::{Liveness, ProcessHandle, ProcessInfo};
pub use registry::{RegistryEntry, StreamGuard, StreamRegistry};
pub use stream::{Profile, StreamConfig, StreamId};
pub use supervisor::{ShutdownReport, Supervisor};
pub use terminate::Termination;
