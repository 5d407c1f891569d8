//! Error types for Parley

use thiserror::Error;

/// Errors surfaced by the ephemeral store backends
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(#[from] redis::RedisError),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("wrong value type at key {0}")]
    WrongType(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
