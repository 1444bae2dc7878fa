//! Per-stream guards and current-process slots.
//!
//! Locking is two-tier. The [`DashMap`] only protects creation of guards: a
//! guard is inserted with a single compare-and-insert and then cloned out, so
//! the map is never held across an await. Everything that touches a stream's
//! current process happens under that stream's own [`StreamGuard`], which
//! serializes acquire and stop for one identifier without blocking others.
//!
//! Guards are never removed. Removing a stream's process empties its slot but
//! keeps the guard, so a caller still waiting on the old guard and a caller
//! arriving later always contend on the same lock.

use crate::process::ProcessHandle;
use crate::stream::StreamId;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Mutual-exclusion guard for one stream identifier.
pub type StreamGuard = Arc<Mutex<RegistryEntry>>;

/// State protected by a stream's guard.
#[derive(Debug, Default)]
pub struct RegistryEntry {
    current: Option<ProcessHandle>,
}

impl RegistryEntry {
    /// The current process, if any. May refer to a process that has exited.
    pub fn read(&self) -> Option<&ProcessHandle> {
        self.current.as_ref()
    }

    /// Make `handle` the current process, returning the one it replaces.
    pub fn write(&mut self, handle: ProcessHandle) -> Option<ProcessHandle> {
        self.current.replace(handle)
    }

    /// Detach the current process from the registry.
    pub fn remove(&mut self) -> Option<ProcessHandle> {
        self.current.take()
    }
}

/// Map from stream identifier to its guard.
#[derive(Debug, Default)]
pub struct StreamRegistry {
    guards: DashMap<StreamId, StreamGuard>,
}

impl StreamRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Guard for `id`, created on first use. Concurrent callers for the same
    /// identifier always get the same guard.
    pub fn guard(&self, id: StreamId) -> StreamGuard {
        self.guards.entry(id).or_default().value().clone()
    }

    /// Guard for `id` if one was ever created.
    pub fn existing_guard(&self, id: StreamId) -> Option<StreamGuard> {
        self.guards.get(&id).map(|guard| guard.value().clone())
    }

    /// Snapshot of every identifier seen so far, in ascending order.
    pub fn stream_ids(&self) -> Vec<StreamId> {
        let mut ids: Vec<StreamId> = self.guards.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Current process for `id`, without waiting on the stream's guard.
    ///
    /// Returns `None` when the guard is held by an in-flight acquire or stop.
    pub fn current(&self, id: StreamId) -> Option<ProcessHandle> {
        let guard = self.existing_guard(id)?;
        let entry = guard.try_lock().ok()?;
        entry.read().cloned()
    }

    /// Number of identifiers with a guard.
    pub fn len(&self) -> usize {
        self.guards.len()
    }

    /// Whether no guard was ever created.
    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}
