//! Error types for the stream supervisor.
//!
//! Only launch-side failures ever reach a caller. Processes that died on their
//! own, graceful stops that time out and escalate to a kill, and handles that
//! outlive their registry slot are all handled internally and only show up in
//! the logs.
//!
//! # Error Hierarchy
//!
//! ```text
//! SupervisorError
//! ├── InvalidSource     (empty source locator)
//! ├── BinaryNotFound    (launcher executable not resolvable)
//! ├── LaunchFailed      (OS refused to spawn the process)
//! ├── ShutDown          (acquire after shutdown_all began)
//! └── Io                (unexpected I/O while inspecting a child)
//! ```

use crate::stream::StreamId;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for supervisor operations.
pub type Result<T> = std::result::Result<T, SupervisorError>;

/// Errors surfaced by the supervisor.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The stream has no usable source locator.
    #[error("Stream '{name}' ({id}) has an empty source")]
    InvalidSource {
        /// Stream identifier.
        id: StreamId,
        /// Display name of the stream.
        name: String,
    },

    /// The transcoder executable could not be resolved.
    #[error("Transcoder binary not found: {binary}")]
    BinaryNotFound {
        /// The binary name or path that was looked up.
        binary: PathBuf,
    },

    /// The operating system refused to start the process.
    #[error("Failed to launch process for stream '{name}' ({id}): {source}")]
    LaunchFailed {
        /// Stream identifier.
        id: StreamId,
        /// Display name of the stream.
        name: String,
        /// Underlying spawn error.
        #[source]
        source: std::io::Error,
    },

    /// The supervisor is shutting down and no longer starts processes.
    #[error("Supervisor is shutting down")]
    ShutDown,

    /// I/O error while talking to a child process.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SupervisorError {
    /// Whether this error happened while trying to start a process.
    ///
    /// These are the failures an HTTP caller sees as "could not start the
    /// stream"; retrying later is up to the caller.
    pub fn is_launch_failure(&self) -> bool {
        matches!(
            self,
            SupervisorError::InvalidSource { .. }
                | SupervisorError::BinaryNotFound { .. }
                | SupervisorError::LaunchFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_source_display() {
        let error = SupervisorError::InvalidSource {
            id: StreamId::new(7),
            name: "lobby".to_string(),
        };
        assert_eq!(error.to_string(), "Stream 'lobby' (7) has an empty source");
    }

    #[test]
    fn test_launch_failed_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let error = SupervisorError::LaunchFailed {
            id: StreamId::new(1),
            name: "cam".to_string(),
            source: io,
        };

        assert!(error.to_string().contains("no such file"));
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn test_launch_failure_classification() {
        assert!(SupervisorError::BinaryNotFound { binary: "ffmpeg".into() }.is_launch_failure());
        assert!(!SupervisorError::ShutDown.is_launch_failure());

        let io: SupervisorError = std::io::Error::other("boom").into();
        assert!(!io.is_launch_failure());
    }
}
