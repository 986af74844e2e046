//! Disruption error types.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by a single node's reconciliation pass.
///
/// None of these abort the controller; they are scoped to one node and
/// retried with backoff unless [`DisruptionError::is_retryable`] says
/// otherwise.
#[derive(Debug, Error)]
pub enum DisruptionError {
    #[error("state store error: {0}")]
    State(#[from] warpgrid_state::StateError),

    #[error("listing pods for node {node}: {reason}")]
    ListPods { node: String, reason: String },

    #[error("deleting node {node}: {reason}")]
    DeleteNode { node: String, reason: String },

    #[error("checking drift for node {node}: {reason}")]
    DriftCheck { node: String, reason: String },

    #[error("parsing emptiness timestamp {value:?} on node {node}: {source}")]
    InvalidTimestamp {
        node: String,
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("{op} cancelled")]
    Cancelled { op: &'static str },

    #[error("{op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl DisruptionError {
    /// Whether retrying the same pass can succeed without outside help.
    ///
    /// A malformed emptiness timestamp stays malformed until an operator
    /// fixes it, and bad configuration never heals on its own.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            DisruptionError::InvalidTimestamp { .. } | DisruptionError::Config(_)
        )
    }
}

pub type DisruptionResult<T> = Result<T, DisruptionError>;
