//! Scheduler error types.

use thiserror::Error;

/// Errors that stop the scheduler loop.
///
/// Declined offers and unexpected task statuses are not errors; they are
/// logged and the loop carries on.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("unsupported master version: {0}")]
    UnsupportedVersion(String),

    #[error("task encoding error: {0}")]
    Encode(String),

    #[error("state store error: {0}")]
    State(#[from] fsgrid_state::StateError),

    #[error("cluster connection closed")]
    Disconnected,
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
