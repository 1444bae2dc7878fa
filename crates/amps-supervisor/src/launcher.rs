//! Building transcoder command lines.
//!
//! [`ProcessLauncher`] is the seam between the supervisor and the external
//! tool. The supervisor owns stdio wiring and spawning; a launcher only
//! decides which program runs with which arguments.

use crate::config::SupervisorConfig;
use crate::error::{Result, SupervisorError};
use crate::stream::{Profile, StreamConfig};
use serde_json::Value;
use std::fmt::Debug;
use std::path::PathBuf;
use tokio::process::Command;

/// Produces the command for a stream's transcoder process.
pub trait ProcessLauncher: Send + Sync + Debug {
    /// Build the command for `stream` with the output options in `profile`.
    ///
    /// Errors here are launch failures and are reported to the acquire caller.
    fn command(&self, stream: &StreamConfig, profile: &Profile) -> Result<Command>;
}

/// Launches `ffmpeg -i <source> <profile options> <output>`.
#[derive(Debug, Clone)]
pub struct FfmpegLauncher {
    binary: PathBuf,
    input_args: Vec<String>,
    output_target: String,
}

impl FfmpegLauncher {
    /// Launcher for the `ffmpeg` found on `PATH`, writing to stdout.
    pub fn new() -> Self {
        Self::from_config(&SupervisorConfig::default())
    }

    /// Launcher honouring the binary, input args and output target in `config`.
    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self {
            binary: config
                .ffmpeg_binary
                .clone()
                .unwrap_or_else(|| PathBuf::from("ffmpeg")),
            input_args: config.input_args.clone(),
            output_target: config.output_target.clone(),
        }
    }

    /// Resolve the executable, either an explicit path or a name on `PATH`.
    fn resolve_binary(&self) -> Result<PathBuf> {
        which::which(&self.binary).map_err(|_| SupervisorError::BinaryNotFound {
            binary: self.binary.clone(),
        })
    }

    /// Full argument vector for a stream, without the program name.
    pub fn args(&self, stream: &StreamConfig, profile: &Profile) -> Vec<String> {
        let mut args = Vec::with_capacity(self.input_args.len() + profile.len() * 2 + 4);
        args.extend(self.input_args.iter().cloned());
        args.push("-i".to_string());
        args.push(stream.source.clone());
        args.extend(profile_args(profile));
        args.push(self.output_target.clone());
        args
    }
}

impl Default for FfmpegLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessLauncher for FfmpegLauncher {
    fn command(&self, stream: &StreamConfig, profile: &Profile) -> Result<Command> {
        let binary = self.resolve_binary()?;
        let mut cmd = Command::new(binary);
        cmd.args(self.args(stream, profile));
        Ok(cmd)
    }
}

/// Render profile options as command-line flags.
///
/// Keys come out sorted. `null` yields a bare flag, arrays repeat the flag
/// once per element, everything else is `-key value`. The long aliases
/// `format`, `video_bitrate` and `audio_bitrate` map to `f`, `b:v` and `b:a`.
pub fn profile_args(profile: &Profile) -> Vec<String> {
    let mut args = Vec::new();
    for (key, value) in profile.iter() {
        let flag = format!("-{}", option_alias(key));
        match value {
            Value::Array(items) => {
                for item in items {
                    args.push(flag.clone());
                    if let Some(rendered) = render_value(item) {
                        args.push(rendered);
                    }
                }
            }
            other => {
                args.push(flag);
                if let Some(rendered) = render_value(other) {
                    args.push(rendered);
                }
            }
        }
    }
    args
}

fn option_alias(key: &str) -> &str {
    match key {
        "format" => "f",
        "video_bitrate" => "b:v",
        "audio_bitrate" => "b:a",
        other => other,
    }
}

fn render_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
