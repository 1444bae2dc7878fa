//! Service configuration.
//!
//! Loaded from a TOML file, then overridden by `AMPS_*` environment variables
//! and finally by command-line flags in `main`.
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 5000
//!
//! [supervisor]
//! stop_timeout_ms = 5000
//!
//! [profiles.mpegts_copy]
//! f = "mpegts"
//! c = "copy"
//!
//! [[streams]]
//! id = 1
//! name = "Lobby"
//! source = "rtsp://camera.local/stream1"
//! ffmpeg_profile = "mpegts_copy"
//! ```

use crate::store::StreamRecord;
use amps_supervisor::{Profile, SupervisorConfig};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Config file used when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "amps.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub supervisor: SupervisorConfig,
    pub profiles: BTreeMap<String, Profile>,
    pub streams: Vec<StreamRecord>,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

impl ServerConfig {
    /// `host:port` for binding.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl AppConfig {
    /// Load from `path` (or `amps.toml` in the working directory), apply
    /// environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let mut config = Self::from_file(&path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a config file. A missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        tracing::info!("Loading config from {:?}", path);
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        toml::from_str(&contents).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Apply `AMPS_HOST`, `AMPS_PORT`, `AMPS_FFMPEG` and `AMPS_STOP_TIMEOUT_MS`.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(host) = var("AMPS_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("AMPS_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid AMPS_PORT: {}", port))?;
        }
        if let Some(binary) = var("AMPS_FFMPEG") {
            self.supervisor.ffmpeg_binary = Some(PathBuf::from(binary));
        }
        if let Some(timeout) = var("AMPS_STOP_TIMEOUT_MS") {
            self.supervisor.stop_timeout_ms = timeout
                .parse()
                .with_context(|| format!("Invalid AMPS_STOP_TIMEOUT_MS: {}", timeout))?;
        }
        Ok(())
    }

    /// Check that every configured stream is launchable.
    pub fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for stream in &self.streams {
            if !seen.insert(stream.id) {
                bail!("Duplicate stream id {}", stream.id);
            }
            if stream.source.trim().is_empty() {
                bail!("Stream {} ('{}') has an empty source", stream.id, stream.name);
            }
            if !self.profiles.contains_key(&stream.ffmpeg_profile) {
                bail!(
                    "Stream {} ('{}') references unknown ffmpeg_profile '{}'",
                    stream.id,
                    stream.name,
                    stream.ffmpeg_profile
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amps_supervisor::StreamId;
    use std::collections::HashMap;
    use std::io::Write;

    const SAMPLE: &str = r#"
[server]
host = "0.0.0.0"
port = 8080

[supervisor]
stop_timeout_ms = 1500

[profiles.copy]
f = "mpegts"
c = "copy"

[[streams]]
id = 3
name = "Lobby"
source = "rtsp://camera.local/stream1"
ffmpeg_profile = "copy"
"#;

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();

        assert_eq!(config.server.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.supervisor.stop_timeout_ms, 1500);
        assert_eq!(config.supervisor.output_target, "pipe:1");
        assert_eq!(config.profiles["copy"].len(), 2);
        assert_eq!(config.streams[0].id, StreamId::new(3));
        config.validate().unwrap();
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::from_file(&dir.path().join("absent.toml")).unwrap();

        assert_eq!(config.server.port, 5000);
        assert!(config.streams.is_empty());
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[server\nport = ").unwrap();

        let err = AppConfig::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("AMPS_HOST", "10.0.0.1"),
            ("AMPS_PORT", "9000"),
            ("AMPS_FFMPEG", "/opt/ffmpeg/bin/ffmpeg"),
            ("AMPS_STOP_TIMEOUT_MS", "250"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server.bind_address(), "10.0.0.1:9000");
        assert_eq!(
            config.supervisor.ffmpeg_binary,
            Some(PathBuf::from("/opt/ffmpeg/bin/ffmpeg"))
        );
        assert_eq!(config.supervisor.stop_timeout_ms, 250);
    }

    #[test]
    fn test_bad_port_override() {
        let mut config = AppConfig::default();
        let err = config
            .apply_overrides(|key| (key == "AMPS_PORT").then(|| "http".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("Invalid AMPS_PORT"));
    }

    #[test]
    fn test_validate_rejects_unknown_profile() {
        let config = AppConfig {
            streams: vec![StreamRecord {
                id: StreamId::new(1),
                name: "cam".to_string(),
                source: "rtsp://cam".to_string(),
                ffmpeg_profile: "missing".to_string(),
            }],
            ..Default::default()
        };

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("unknown ffmpeg_profile 'missing'"));
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let mut profiles = BTreeMap::new();
        profiles.insert("copy".to_string(), Profile::new());
        let record = StreamRecord {
            id: StreamId::new(1),
            name: "cam".to_string(),
            source: "rtsp://cam".to_string(),
            ffmpeg_profile: "copy".to_string(),
        };

        let config = AppConfig {
            profiles,
            streams: vec![record.clone(), record],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
