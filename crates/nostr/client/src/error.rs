//! Transport and pool error taxonomy (spec.md §7's lower layers).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid relay url: {0}")]
    InvalidUrl(String),

    #[error("already connected")]
    AlreadyConnected,

    #[error("not connected")]
    NotConnected,

    #[error("connect failed: {0}")]
    ConnectFailed(String),

    #[error("connection timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("websocket error: {0}")]
    WebSocket(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("publish to {relay} timed out waiting for acknowledgment")]
    PublishTimeout { relay: String },

    #[error("publish rejected by {relay}: {reason}")]
    PublishRejected { relay: String, reason: String },

    #[error("no relays specified")]
    NoRelays,

    #[error("publish to {target} relays reached only {confirmed} of the required {required} confirmations")]
    InsufficientConfirmations {
        target: usize,
        confirmed: usize,
        required: usize,
    },

    #[error(transparent)]
    Core(#[from] nostr::CoreError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
