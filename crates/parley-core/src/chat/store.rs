//! Session store trait and its object-safe wrapper.
//!
//! Replaces the process-global session mapping with an explicit port.
//! Implementations live in parley-infra: an in-memory `DashMap` store for a
//! single instance and a SQLite store for state shared between instances.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use parley_types::chat::SessionId;
use parley_types::error::RepositoryError;
use parley_types::llm::Message;

/// What a store keeps per session.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSession {
    /// Business whose prompt seeded the history.
    pub business: String,
    /// System message first, then the turn window.
    pub messages: Vec<Message>,
    pub updated_at: DateTime<Utc>,
}

impl StoredSession {
    pub fn new(business: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            business: business.into(),
            messages,
            updated_at: Utc::now(),
        }
    }
}

/// Trait for session-scoped conversation history storage.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait SessionStore: Send + Sync {
    /// Load a session. Returns None if the session is unknown.
    fn load(
        &self,
        session_id: &SessionId,
    ) -> impl Future<Output = Result<Option<StoredSession>, RepositoryError>> + Send;

    /// Replace a session (upsert).
    fn save(
        &self,
        session_id: &SessionId,
        session: &StoredSession,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Drop a session. No-op if it does not exist.
    fn remove(
        &self,
        session_id: &SessionId,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Number of live sessions.
    fn count(&self) -> impl Future<Output = Result<usize, RepositoryError>> + Send;

    /// Drop every session last saved before `cutoff`. Returns how many went.
    fn prune_idle(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl Future<Output = Result<usize, RepositoryError>> + Send;
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe version of [`SessionStore`] with boxed futures.
pub trait SessionStoreDyn: Send + Sync {
    fn load_boxed<'a>(
        &'a self,
        session_id: &'a SessionId,
    ) -> BoxFuture<'a, Result<Option<StoredSession>, RepositoryError>>;

    fn save_boxed<'a>(
        &'a self,
        session_id: &'a SessionId,
        session: &'a StoredSession,
    ) -> BoxFuture<'a, Result<(), RepositoryError>>;

    fn remove_boxed<'a>(
        &'a self,
        session_id: &'a SessionId,
    ) -> BoxFuture<'a, Result<(), RepositoryError>>;

    fn count_boxed(&self) -> BoxFuture<'_, Result<usize, RepositoryError>>;

    fn prune_idle_boxed(&self, cutoff: DateTime<Utc>) -> BoxFuture<'_, Result<usize, RepositoryError>>;
}

impl<T: SessionStore> SessionStoreDyn for T {
    fn load_boxed<'a>(
        &'a self,
        session_id: &'a SessionId,
    ) -> BoxFuture<'a, Result<Option<StoredSession>, RepositoryError>> {
        Box::pin(self.load(session_id))
    }

    fn save_boxed<'a>(
        &'a self,
        session_id: &'a SessionId,
        session: &'a StoredSession,
    ) -> BoxFuture<'a, Result<(), RepositoryError>> {
        Box::pin(self.save(session_id, session))
    }

    fn remove_boxed<'a>(
        &'a self,
        session_id: &'a SessionId,
    ) -> BoxFuture<'a, Result<(), RepositoryError>> {
        Box::pin(self.remove(session_id))
    }

    fn count_boxed(&self) -> BoxFuture<'_, Result<usize, RepositoryError>> {
        Box::pin(self.count())
    }

    fn prune_idle_boxed(&self, cutoff: DateTime<Utc>) -> BoxFuture<'_, Result<usize, RepositoryError>> {
        Box::pin(self.prune_idle(cutoff))
    }
}

/// Type-erased session store, selected at startup.
pub struct BoxSessionStore {
    inner: Box<dyn SessionStoreDyn + Send + Sync>,
    kind: &'static str,
}

impl BoxSessionStore {
    /// Wrap a concrete store. `kind` names the backend in diagnostics.
    pub fn new<T: SessionStore + 'static>(store: T, kind: &'static str) -> Self {
        Self {
            inner: Box::new(store),
            kind,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub async fn load(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<StoredSession>, RepositoryError> {
        self.inner.load_boxed(session_id).await
    }

    pub async fn save(
        &self,
        session_id: &SessionId,
        session: &StoredSession,
    ) -> Result<(), RepositoryError> {
        self.inner.save_boxed(session_id, session).await
    }

    pub async fn remove(&self, session_id: &SessionId) -> Result<(), RepositoryError> {
        self.inner.remove_boxed(session_id).await
    }

    pub async fn count(&self) -> Result<usize, RepositoryError> {
        self.inner.count_boxed().await
    }

    pub async fn prune_idle(&self, cutoff: DateTime<Utc>) -> Result<usize, RepositoryError> {
        self.inner.prune_idle_boxed(cutoff).await
    }
}
