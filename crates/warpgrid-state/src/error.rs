//! Error types for the WarpGrid state store.

use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during state store operations.
///
/// Backend failures carry the redb message as text; the two domain
/// failures (`NotFound`, `Conflict`) carry enough to identify the record.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("encoding record: {0}")]
    Serialize(String),

    #[error("decoding record: {0}")]
    Deserialize(String),

    #[error("{kind} {key:?} not found")]
    NotFound { kind: &'static str, key: String },

    /// Someone else wrote the record between our read and our write.
    #[error("conflict on {key}: expected version {expected}, found {found}")]
    Conflict {
        key: String,
        expected: u64,
        found: u64,
    },
}
