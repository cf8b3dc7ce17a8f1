//! Error type shared by the core protocol types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("event id mismatch: expected {expected}, got {actual}")]
    IdMismatch { expected: String, actual: String },

    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("invalid secret key")]
    InvalidSecretKey,

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("invalid relay url: {0}")]
    InvalidRelayUrl(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
