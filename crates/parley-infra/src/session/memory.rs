//! In-memory session store backed by a `DashMap`.
//!
//! The default store: one process, sessions vanish on restart.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use parley_core::chat::store::{SessionStore, StoredSession};
use parley_types::chat::SessionId;
use parley_types::error::RepositoryError;

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<SessionId, StoredSession>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    async fn load(&self, session_id: &SessionId) -> Result<Option<StoredSession>, RepositoryError> {
        Ok(self.sessions.get(session_id).map(|entry| entry.value().clone()))
    }

    async fn save(&self, session_id: &SessionId, session: &StoredSession) -> Result<(), RepositoryError> {
        self.sessions.insert(*session_id, session.clone());
        Ok(())
    }

    async fn remove(&self, session_id: &SessionId) -> Result<(), RepositoryError> {
        self.sessions.remove(session_id);
        Ok(())
    }

    async fn count(&self) -> Result<usize, RepositoryError> {
        Ok(self.sessions.len())
    }

    async fn prune_idle(&self, cutoff: DateTime<Utc>) -> Result<usize, RepositoryError> {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| session.updated_at >= cutoff);
        Ok(before.saturating_sub(self.sessions.len()))
    }
}
