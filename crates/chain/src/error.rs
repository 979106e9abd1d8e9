//! Errors surfaced by chain-facing collaborators.

use alloy_primitives::B256;
use thiserror::Error;

/// Transport-level or chain-level failure.
///
/// Every variant is treated as transient by the reporting engine: the
/// failing report is abandoned and the next scheduled tick retries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("http {status}: {body}")]
    Http { status: u16, body: String },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("request timed out")]
    Timeout,

    #[error("transaction {0} reverted")]
    Reverted(B256),
}

impl From<reqwest::Error> for ChainError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ChainError::Timeout
        } else if e.is_decode() {
            ChainError::Decode(e.to_string())
        } else {
            ChainError::Transport(e.to_string())
        }
    }
}
