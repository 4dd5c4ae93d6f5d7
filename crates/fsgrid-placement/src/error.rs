//! Error types for committing a placement.

use fsgrid_state::StateError;
use thiserror::Error;

pub type PlacementResult<T> = Result<T, PlacementError>;

#[derive(Debug, Error)]
pub enum PlacementError {
    #[error("no namenode")]
    NoNamenode,

    #[error("namenode not started")]
    NamenodeNotStarted,

    #[error("no ipc port")]
    NoIpcPort,

    #[error(transparent)]
    State(#[from] StateError),
}
