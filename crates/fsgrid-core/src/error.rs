//! Error types for core value parsing.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("invalid period: {0}")]
    InvalidPeriod(String),

    #[error("invalid map: {0}")]
    InvalidMap(String),

    #[error("invalid constraint: {0}")]
    InvalidConstraint(String),

    #[error("invalid node expression: {0}")]
    InvalidExpr(String),

    #[error("invalid version: {0}")]
    InvalidVersion(String),

    #[error("config error: {0}")]
    Config(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
