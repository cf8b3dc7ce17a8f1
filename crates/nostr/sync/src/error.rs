//! The engine-level error taxonomy (spec.md §7).

use std::collections::BTreeMap;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no relays in target set")]
    NoRelays,

    #[error("unable to connect {url}")]
    ConnectFailed { url: String },

    #[error("batch fetch timed out")]
    FetchTimeout,

    #[error("batch fetch closed unexpectedly: {reasons:?}")]
    FetchClosedUnexpectedly { reasons: BTreeMap<String, String> },

    #[error("publish of {event_id} rejected: {reasons:?}")]
    PublishRejected {
        event_id: String,
        reasons: BTreeMap<String, String>,
    },

    #[error("relay {url} disconnected mid-run")]
    Disconnected { url: String },

    #[error("sync cancelled")]
    Cancelled,

    #[error("unexpected error: {0}")]
    Unexpected(String),

    #[error(transparent)]
    Client(#[from] nostr_client::ClientError),
}
