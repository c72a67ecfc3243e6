//! Optional infrastructure, connected once at startup.
//!
//! The shared session store and the turn log are each tried once. A failed
//! connection is reported, never fatal: the relay falls back to the
//! in-memory store and runs without a turn log.

use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

use parley_core::chat::store::BoxSessionStore;

use crate::postgres::TurnLog;
use crate::session::InMemorySessionStore;
use crate::sqlite::session::SqliteSessionStore;

/// Outcome of connecting one optional backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum InfraStatus {
    Disabled,
    Connected,
    Unavailable(String),
}

impl fmt::Display for InfraStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InfraStatus::Disabled => write!(f, "disabled"),
            InfraStatus::Connected => write!(f, "connected"),
            InfraStatus::Unavailable(reason) => write!(f, "unavailable: {reason}"),
        }
    }
}

/// Startup report for every optional backend.
#[derive(Debug, Clone, Serialize)]
pub struct InfraReport {
    pub session_store: InfraStatus,
    pub turn_log: InfraStatus,
}

impl InfraReport {
    pub fn log(&self) {
        info!(
            session_store = %self.session_store,
            turn_log = %self.turn_log,
            "Optional infrastructure"
        );
    }
}

/// Open the SQLite session store at `url`, or the in-memory store.
pub async fn open_session_store(url: Option<&str>) -> (BoxSessionStore, InfraStatus) {
    let Some(url) = url else {
        return (
            BoxSessionStore::new(InMemorySessionStore::new(), "memory"),
            InfraStatus::Disabled,
        );
    };

    match SqliteSessionStore::connect(url).await {
        Ok(store) => (BoxSessionStore::new(store, "sqlite"), InfraStatus::Connected),
        Err(err) => {
            warn!(error = %err, "Session store unavailable, using in-memory sessions");
            (
                BoxSessionStore::new(InMemorySessionStore::new(), "memory"),
                InfraStatus::Unavailable(err.to_string()),
            )
        }
    }
}

/// Connect the Postgres turn log at `url`, if configured.
pub async fn open_turn_log(url: Option<&str>) -> (Option<TurnLog>, InfraStatus) {
    let Some(url) = url else {
        return (None, InfraStatus::Disabled);
    };

    match TurnLog::connect(url).await {
        Ok(log) => (Some(log), InfraStatus::Connected),
        Err(err) => {
            warn!(error = %err, "Turn log unavailable, turns will not be recorded");
            (None, InfraStatus::Unavailable(err.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display_and_json() {
        assert_eq!(InfraStatus::Disabled.to_string(), "disabled");
        let unavailable = InfraStatus::Unavailable("refused".into());
        assert_eq!(unavailable.to_string(), "unavailable: refused");

        let json = serde_json::to_value(&unavailable).unwrap();
        assert_eq!(json["state"], "unavailable");
        assert_eq!(json["reason"], "refused");
        assert_eq!(serde_json::to_value(InfraStatus::Connected).unwrap()["state"], "connected");
    }

    #[tokio::test]
    async fn test_no_urls_means_memory_and_no_log() {
        let (store, status) = open_session_store(None).await;
        assert_eq!(store.kind(), "memory");
        assert_eq!(status, InfraStatus::Disabled);

        let (log, status) = open_turn_log(None).await;
        assert!(log.is_none());
        assert_eq!(status, InfraStatus::Disabled);
    }

    #[tokio::test]
    async fn test_sqlite_store_connects() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("s.db").display());

        let (store, status) = open_session_store(Some(&url)).await;
        assert_eq!(store.kind(), "sqlite");
        assert_eq!(status, InfraStatus::Connected);
    }

    #[tokio::test]
    async fn test_bad_sqlite_url_falls_back_to_memory() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("missing").join("dir").join("s.db").display()
        );

        let (store, status) = open_session_store(Some(&url)).await;
        assert_eq!(store.kind(), "memory");
        assert!(matches!(status, InfraStatus::Unavailable(_)));
    }
}
