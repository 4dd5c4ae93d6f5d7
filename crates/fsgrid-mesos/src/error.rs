//! Mesos client error types.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MesosError {
    #[error("invalid master address: {0}")]
    InvalidMaster(String),

    #[error("connection to {addr} failed: {reason}")]
    Connect { addr: String, reason: String },

    #[error("http error: {0}")]
    Http(String),

    #[error("master responded {status}: {body}")]
    Status { status: u16, body: String },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no heartbeat for {0:?}")]
    HeartbeatTimeout(Duration),
}

pub type MesosResult<T> = Result<T, MesosError>;
