use crate::domain::models::{RecordId, RecordKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("{kind} record not found: id={id}")]
    NotFound { kind: RecordKind, id: RecordId },
    #[error("{kind} record already exists for {key}")]
    Duplicate { kind: RecordKind, key: String },
    #[error("commit failed: {failed} of {total} store operations were rejected: {}", .details.join("; "))]
    CommitFailed {
        failed: usize,
        total: usize,
        details: Vec<String>,
    },
    #[error("a commit is already in progress")]
    CommitInProgress,
    #[error("no editing session is open")]
    NoSession,
    #[error("store task failed: {0}")]
    Join(String),
}
