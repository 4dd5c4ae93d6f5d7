//! Error types for the fsgrid node registry and its storage.

use fsgrid_core::CoreError;
use thiserror::Error;

/// Result type alias for registry and storage operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors raised by the registry, the node state machine and storage.
///
/// The first group is invalid operator input and is reported back to the
/// caller; the second group is persistence failure.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("node not found: {0}")]
    NotFound(String),

    #[error("duplicate node: {0}")]
    DuplicateNode(String),

    #[error("second name node is not supported")]
    SecondCoordinator,

    #[error("node should be idle: {0}")]
    NotIdle(String),

    #[error("node should not be idle: {0}")]
    AlreadyIdle(String),

    #[error("invalid nodes: {0}")]
    InvalidExpr(String),

    #[error("{0}")]
    Invalid(String),

    // ── Persistence ────────────────────────────────────────────────
    #[error("failed to open storage: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("unsupported schema version: {0}")]
    SchemaVersion(u32),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl StateError {
    /// True for rejected operator input, false for storage failures.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            StateError::NotFound(_)
                | StateError::DuplicateNode(_)
                | StateError::SecondCoordinator
                | StateError::NotIdle(_)
                | StateError::AlreadyIdle(_)
                | StateError::InvalidExpr(_)
                | StateError::Invalid(_)
        )
    }
}

impl From<CoreError> for StateError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidExpr(expr) => StateError::InvalidExpr(expr),
            other => StateError::Invalid(other.to_string()),
        }
    }
}
