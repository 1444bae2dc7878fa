//! Stream definitions as seen by the supervisor.
//!
//! The supervisor never stores these. A [`StreamConfig`] and a [`Profile`] are
//! handed in by value on every acquire and only the launcher looks at them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Externally assigned stream identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(u64);

impl StreamId {
    /// Wrap a raw identifier.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw identifier.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for StreamId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// What the supervisor needs to know about a stream to launch it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Stream identifier.
    pub id: StreamId,

    /// Display name, only used to tag log output.
    #[serde(default)]
    pub name: String,

    /// Source locator handed to the transcoder (URI, device path, file).
    pub source: String,
}

impl StreamConfig {
    /// Create a new stream config.
    pub fn new(id: impl Into<StreamId>, name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            source: source.into(),
        }
    }

    /// Name used in logs, falling back to `Stream <id>` for unnamed streams.
    pub fn display_name(&self) -> String {
        if self.name.trim().is_empty() {
            format!("Stream {}", self.id)
        } else {
            self.name.clone()
        }
    }
}

/// Output options passed opaquely to the launcher.
///
/// Values are JSON scalars, `null` for bare flags, or arrays for options that
/// repeat. Keys iterate in sorted order so a profile always renders to the
/// same command line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Profile(BTreeMap<String, Value>);

impl Profile {
    /// Empty profile.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Look up an option.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Iterate options in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of options.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the profile has no options.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Value)> for Profile {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
