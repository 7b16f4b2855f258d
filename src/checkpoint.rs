//! The checkpoint interface (C7): fire-and-forget persistence of state
//! snapshots, keyed by session.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

/// Persists [`crate::state::State`] snapshots out-of-band.
///
/// Strategies call [`CheckpointStore::save`] fire-and-forget: failures are
/// logged by the caller and never fail the step that triggered them (see
/// the common step procedure's checkpoint stage). Implementations must be
/// idempotent with respect to repeated calls for the same `session_id`
/// (last-write-wins is acceptable) because the runtime does not serialize
/// saves within a session.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist `snapshot` under `session_id`.
    ///
    /// # Errors
    ///
    /// Returns an error description; callers log it and continue.
    async fn save(&self, session_id: &str, snapshot: Value) -> Result<(), String>;
}

/// A boxed, shared [`CheckpointStore`].
pub type BoxedCheckpointStore = std::sync::Arc<dyn CheckpointStore>;

/// An in-process [`CheckpointStore`] backed by a `HashMap`, keeping only the
/// latest snapshot per session.
///
/// Useful as a default collaborator for tests and for agents that do not
/// need durable persistence.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    snapshots: Mutex<HashMap<String, Value>>,
}

impl InMemoryCheckpointStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read back the most recently saved snapshot for `session_id`, if any.
    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<Value> {
        self.snapshots
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(session_id)
            .cloned()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, session_id: &str, snapshot: Value) -> Result<(), String> {
        self.snapshots
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(session_id.to_owned(), snapshot);
        Ok(())
    }
}
