//! SQLite session store.
//!
//! Each session is one row; its messages are stored as a JSON array and
//! `updated_at` as unix milliseconds so idle pruning is one range delete.

use chrono::{DateTime, Utc};
use sqlx::Row;

use parley_core::chat::store::{SessionStore, StoredSession};
use parley_types::chat::SessionId;
use parley_types::error::RepositoryError;

use super::pool::DatabasePool;

/// SQLite-backed implementation of [`SessionStore`].
pub struct SqliteSessionStore {
    pool: DatabasePool,
}

impl SqliteSessionStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Open the database at `url` and wrap it in a store.
    pub async fn connect(url: &str) -> Result<Self, RepositoryError> {
        let pool = DatabasePool::new(url)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(Self::new(pool))
    }
}

impl SessionStore for SqliteSessionStore {
    async fn load(&self, session_id: &SessionId) -> Result<Option<StoredSession>, RepositoryError> {
        let row = sqlx::query("SELECT business, messages, updated_at FROM sessions WHERE session_id = ?")
            .bind(session_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let business: String = row
            .try_get("business")
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        let json: String = row
            .try_get("messages")
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        let millis: i64 = row
            .try_get("updated_at")
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let messages = serde_json::from_str(&json)
            .map_err(|e| RepositoryError::Query(format!("invalid messages JSON: {e}")))?;
        let updated_at = DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| RepositoryError::Query(format!("invalid updated_at: {millis}")))?;

        Ok(Some(StoredSession {
            business,
            messages,
            updated_at,
        }))
    }

    async fn save(&self, session_id: &SessionId, session: &StoredSession) -> Result<(), RepositoryError> {
        let json = serde_json::to_string(&session.messages)
            .map_err(|e| RepositoryError::Query(format!("failed to serialize messages: {e}")))?;

        sqlx::query(
            r#"INSERT INTO sessions (session_id, business, messages, updated_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT (session_id) DO UPDATE SET
                   business = excluded.business,
                   messages = excluded.messages,
                   updated_at = excluded.updated_at"#,
        )
        .bind(session_id.to_string())
        .bind(&session.business)
        .bind(&json)
        .bind(session.updated_at.timestamp_millis())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn remove(&self, session_id: &SessionId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM sessions WHERE session_id = ?")
            .bind(session_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(())
    }

    async fn count(&self) -> Result<usize, RepositoryError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions")
            .fetch_one(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(count as usize)
    }

    async fn prune_idle(&self, cutoff: DateTime<Utc>) -> Result<usize, RepositoryError> {
        let result = sqlx::query("DELETE FROM sessions WHERE updated_at < ?")
            .bind(cutoff.timestamp_millis())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(result.rows_affected() as usize)
    }
}
