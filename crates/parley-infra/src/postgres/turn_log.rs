//! Write-only turn log in Postgres.
//!
//! The relay pushes a [`TurnRecord`] onto an unbounded channel after every
//! turn; [`TurnLog::spawn_writer`] drains that channel into the `turn_log`
//! table. Insert failures are logged and the record is dropped.
//!
//! On shutdown the senders are dropped first and [`TurnLogWriter::finish`]
//! waits for the queue to empty, up to a grace period.

use std::future::Future;
use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use parley_types::chat::TurnRecord;
use parley_types::error::RepositoryError;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS turn_log (
    id          BIGSERIAL PRIMARY KEY,
    session_id  UUID NOT NULL,
    business    TEXT NOT NULL,
    user_text   TEXT NOT NULL,
    reply_text  TEXT NOT NULL,
    language    TEXT NOT NULL,
    fallback    TEXT,
    latency_ms  BIGINT NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL
)
"#;

#[derive(Clone)]
pub struct TurnLog {
    pool: PgPool,
}

impl TurnLog {
    /// Connect and create the table if needed.
    pub async fn connect(database_url: &str) -> Result<Self, RepositoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        sqlx::query(SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(Self { pool })
    }

    pub async fn insert(&self, record: &TurnRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO turn_log
               (session_id, business, user_text, reply_text, language, fallback, latency_ms, created_at)
               VALUES ($1::uuid, $2, $3, $4, $5, $6, $7, $8::timestamptz)"#,
        )
        .bind(record.session_id.to_string())
        .bind(&record.business)
        .bind(&record.user_text)
        .bind(&record.reply_text)
        .bind(&record.language)
        .bind(fallback_label(record))
        .bind(record.latency_ms as i64)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(())
    }

    /// Drain `records` into the table until every sender is dropped.
    pub fn spawn_writer(self, records: mpsc::UnboundedReceiver<TurnRecord>) -> TurnLogWriter {
        spawn_drain(records, move |record| {
            let log = self.clone();
            async move { log.insert(&record).await }
        })
    }
}

/// Handle to the background task that empties the turn log queue.
pub struct TurnLogWriter {
    handle: JoinHandle<()>,
}

impl TurnLogWriter {
    /// Wait for queued records to be written. Call after every sender is
    /// dropped. Returns false if `grace` ran out and the rest was abandoned.
    pub async fn finish(self, grace: Duration) -> bool {
        let abort = self.handle.abort_handle();
        match tokio::time::timeout(grace, self.handle).await {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                warn!(error = %err, "Turn log writer task failed");
                false
            }
            Err(_) => {
                abort.abort();
                warn!(grace_ms = grace.as_millis() as u64, "Turn log not drained in time, dropping the rest");
                false
            }
        }
    }
}

fn spawn_drain<F, Fut>(mut records: mpsc::UnboundedReceiver<TurnRecord>, insert: F) -> TurnLogWriter
where
    F: Fn(TurnRecord) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), RepositoryError>> + Send,
{
    let handle = tokio::spawn(async move {
        while let Some(record) = records.recv().await {
            let session_id = record.session_id;
            match insert(record).await {
                Ok(()) => debug!(%session_id, "Turn logged"),
                Err(err) => warn!(%session_id, error = %err, "Failed to write turn log row"),
            }
        }
        debug!("Turn log writer stopped");
    });
    TurnLogWriter { handle }
}

fn fallback_label(record: &TurnRecord) -> Option<String> {
    record.fallback.map(|reason| reason.to_string())
}
