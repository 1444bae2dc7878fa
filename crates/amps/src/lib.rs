//! AMPS: a small HTTP service that manages stream definitions and keeps one
//! ffmpeg process per stream through [`amps_supervisor`].

pub mod api;
pub mod config;
pub mod store;

/// Crate version reported by `/health`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
