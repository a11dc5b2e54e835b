//! SessionRegistry - the primary public API for hosting stories.
//!
//! Each session owns an independent orchestrator and state. The registry
//! is the only place sessions are created, looked up, and dropped; a
//! transport layer keys its requests by [`SessionId`].

use crate::completion::CompletionService;
use crate::narrator::{StoryConfig, StoryError, StoryOrchestrator};
use crate::segment::NarrativeSegment;
use crate::state::{NarrativeState, SnapshotError};
use crate::world::WorldState;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Unique identifier for a story session.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new random ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an ID from an existing UUID
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", &self.0.to_string()[..8])
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Errors from registry operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(SessionId),

    #[error("Session already exists: {0}")]
    AlreadyExists(SessionId),

    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(#[from] SnapshotError),

    #[error("Story error: {0}")]
    Story(#[from] StoryError),
}

type SharedStory = Arc<Mutex<StoryOrchestrator>>;

/// Owns every live story session.
///
/// The session map is behind a read-write lock and each story behind its own
/// mutex. The map lock is never held while a story waits on the completion
/// service, so sessions progress independently; turns within one session are
/// serialized.
pub struct SessionRegistry {
    completion: Arc<dyn CompletionService>,
    config: StoryConfig,
    sessions: RwLock<HashMap<SessionId, SharedStory>>,
}

impl SessionRegistry {
    /// Create a registry whose sessions share one completion service and
    /// start from `config`.
    pub fn new(completion: Arc<dyn CompletionService>, config: StoryConfig) -> Self {
        Self {
            completion,
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Start a new story with the configured initial world.
    pub async fn create(&self) -> SessionId {
        let id = SessionId::new();
        let story = StoryOrchestrator::new(self.completion.clone(), self.config.clone());
        self.sessions
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(story)));
        tracing::info!(session_id = %id, "session created");
        id
    }

    /// Start a new story under a caller-chosen id.
    pub async fn create_with_id(&self, id: SessionId) -> Result<(), SessionError> {
        let story = StoryOrchestrator::new(self.completion.clone(), self.config.clone());
        self.insert(id, story).await
    }

    /// Start a new story from a caller-supplied world.
    pub async fn create_with_world(&self, world: WorldState) -> SessionId {
        let id = SessionId::new();
        let config = self.config.clone().with_initial_world(world);
        let story = StoryOrchestrator::new(self.completion.clone(), config);
        self.sessions
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(story)));
        tracing::info!(session_id = %id, "session created with custom world");
        id
    }

    /// Register a session that continues from a client-held snapshot.
    ///
    /// The snapshot must agree with the configured act schedule and hold only
    /// valid segments.
    pub async fn resume(&self, id: SessionId, state: NarrativeState) -> Result<(), SessionError> {
        let story = StoryOrchestrator::resume(self.completion.clone(), self.config.clone(), state)
            .inspect_err(|e| {
                tracing::warn!(session_id = %id, error = %e, "snapshot rejected");
            })?;
        self.insert(id, story).await
    }

    async fn insert(&self, id: SessionId, story: StoryOrchestrator) -> Result<(), SessionError> {
        match self.sessions.write().await.entry(id) {
            Entry::Occupied(_) => Err(SessionError::AlreadyExists(id)),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(story)));
                tracing::info!(session_id = %id, "session registered");
                Ok(())
            }
        }
    }

    async fn session(&self, id: SessionId) -> Result<SharedStory, SessionError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(SessionError::NotFound(id))
    }

    /// Play one turn of a session.
    pub async fn advance(
        &self,
        id: SessionId,
        choice: Option<&str>,
    ) -> Result<NarrativeSegment, SessionError> {
        let story = self.session(id).await?;
        let mut story = story.lock().await;
        let segment = story.advance(choice).await.inspect_err(|e| {
            tracing::warn!(session_id = %id, error = %e, "turn failed");
        })?;
        Ok(segment)
    }

    /// An owned copy of a session's state.
    pub async fn snapshot(&self, id: SessionId) -> Result<NarrativeState, SessionError> {
        let story = self.session(id).await?;
        let story = story.lock().await;
        Ok(story.snapshot())
    }

    /// Drop a session. Returns whether it existed.
    pub async fn remove(&self, id: SessionId) -> bool {
        let removed = self.sessions.write().await.remove(&id).is_some();
        if removed {
            tracing::debug!(session_id = %id, "session removed");
        }
        removed
    }

    pub async fn contains(&self, id: SessionId) -> bool {
        self.sessions.read().await.contains_key(&id)
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
