//! In-memory stream definitions.
//!
//! The store is the record side of the service: it knows names, sources and
//! profile references, and nothing about processes. Handlers that change a
//! stream's source or profile stop its process before touching the store.

use amps_supervisor::{Profile, StreamConfig, StreamId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Store errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// No stream with this id.
    #[error("Stream not found")]
    NotFound(StreamId),

    /// The profile reference does not name a configured profile.
    #[error("ffmpeg_profile '{0}' not found")]
    UnknownProfile(String),

    /// A stream needs a non-empty source to ever launch.
    #[error("source must not be empty")]
    EmptySource,
}

/// A stream definition as exposed over the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRecord {
    /// Identifier, assigned by the store on create.
    pub id: StreamId,
    /// Display name.
    pub name: String,
    /// Source locator.
    pub source: String,
    /// Name of the output profile.
    pub ffmpeg_profile: String,
}

impl StreamRecord {
    /// What the supervisor needs from this record.
    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig::new(self.id, self.name.clone(), self.source.clone())
    }
}

/// Fields of a new stream.
#[derive(Debug, Clone, Deserialize)]
pub struct NewStream {
    pub name: String,
    pub source: String,
    pub ffmpeg_profile: String,
}

/// Partial update. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub ffmpeg_profile: Option<String>,
}

impl StreamUpdate {
    /// Whether applying this update invalidates a running process.
    pub fn affects_process(&self) -> bool {
        self.source.is_some() || self.ffmpeg_profile.is_some()
    }
}

/// Stream definitions plus the profiles they may reference.
#[derive(Debug, Default)]
pub struct StreamStore {
    streams: RwLock<BTreeMap<StreamId, StreamRecord>>,
    profiles: BTreeMap<String, Profile>,
}

impl StreamStore {
    /// Store seeded with `streams`, validating nothing; see
    /// [`AppConfig::validate`](crate::config::AppConfig::validate).
    pub fn new(profiles: BTreeMap<String, Profile>, streams: Vec<StreamRecord>) -> Self {
        Self {
            streams: RwLock::new(streams.into_iter().map(|s| (s.id, s)).collect()),
            profiles,
        }
    }

    /// All streams ordered by id.
    pub fn list(&self) -> Vec<StreamRecord> {
        self.streams.read().values().cloned().collect()
    }

    /// One stream.
    pub fn get(&self, id: StreamId) -> Result<StreamRecord, StoreError> {
        self.streams
            .read()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    /// A configured profile.
    pub fn profile(&self, name: &str) -> Result<&Profile, StoreError> {
        self.profiles
            .get(name)
            .ok_or_else(|| StoreError::UnknownProfile(name.to_string()))
    }

    /// Names of configured profiles.
    pub fn profile_names(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }

    /// Add a stream under the next free id (one past the largest, starting at 1).
    pub fn create(&self, new: NewStream) -> Result<StreamRecord, StoreError> {
        check_source(&new.source)?;
        self.profile(&new.ffmpeg_profile)?;

        let mut streams = self.streams.write();
        let id = streams
            .keys()
            .next_back()
            .map_or(StreamId::new(1), |last| StreamId::new(last.get() + 1));

        let record = StreamRecord {
            id,
            name: new.name,
            source: new.source,
            ffmpeg_profile: new.ffmpeg_profile,
        };
        streams.insert(id, record.clone());
        Ok(record)
    }

    /// Check an update without applying it.
    pub fn validate_update(&self, id: StreamId, update: &StreamUpdate) -> Result<(), StoreError> {
        if !self.streams.read().contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        self.check_update(update)
    }

    fn check_update(&self, update: &StreamUpdate) -> Result<(), StoreError> {
        if let Some(source) = &update.source {
            check_source(source)?;
        }
        if let Some(profile) = &update.ffmpeg_profile {
            self.profile(profile)?;
        }
        Ok(())
    }

    /// Apply an update and return the new record.
    pub fn update(&self, id: StreamId, update: StreamUpdate) -> Result<StreamRecord, StoreError> {
        self.check_update(&update)?;

        let mut streams = self.streams.write();
        let record = streams.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if let Some(name) = update.name {
            record.name = name;
        }
        if let Some(source) = update.source {
            record.source = source;
        }
        if let Some(profile) = update.ffmpeg_profile {
            record.ffmpeg_profile = profile;
        }
        Ok(record.clone())
    }

    /// Remove a stream and return it.
    pub fn remove(&self, id: StreamId) -> Result<StreamRecord, StoreError> {
        self.streams.write().remove(&id).ok_or(StoreError::NotFound(id))
    }

    /// Number of streams.
    pub fn len(&self) -> usize {
        self.streams.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.streams.read().is_empty()
    }
}

fn check_source(source: &str) -> Result<(), StoreError> {
    if source.trim().is_empty() {
        return Err(StoreError::EmptySource);
    }
    Ok(())
}
