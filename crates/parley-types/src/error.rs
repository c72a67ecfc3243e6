use thiserror::Error;

use crate::chat::SessionId;

/// Errors from session store operations (used by trait definitions in parley-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("query error: {0}")]
    Query(String),
}

/// Errors raised while resolving configuration or the prompt catalog.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown business '{0}'")]
    UnknownBusiness(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Errors raised when binding a request to a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("session {session_id} belongs to business '{stored}', not '{requested}'")]
    BusinessMismatch {
        session_id: SessionId,
        stored: String,
        requested: String,
    },
}
