//! Nostr protocol types shared by the outbox sync engine: events, filters,
//! wire framing, and the NIP-65 relay list model.
//!
//! Split into a `minimal` surface (types + serialization, no crypto) and a
//! `full` surface (adds key generation and event signing, for tests and
//! examples) the same way the rest of this workspace's Nostr stack does.

pub mod error;
pub mod event;
pub mod filter;
pub mod nip65;
pub mod wire;

#[cfg(feature = "full")]
pub mod keys;

pub use error::{CoreError, Result};
pub use event::{Event, EventTemplate, compute_id, event_with_id, verify_id};
pub use filter::Filter;
pub use nip65::{KIND_RELAY_LIST_METADATA, RelayDescriptor, RelayRole, normalize_relay_url, parse_nip65_tags, split_write_read};
pub use wire::{ClientMessage, RelayMessage, parse_client_message, parse_relay_message};

#[cfg(feature = "full")]
pub use keys::{SecretKey, finalize_event, generate_secret_key};

/// NIP-01 short text note.
pub const KIND_SHORT_TEXT_NOTE: u32 = 1;
/// NIP-18 repost.
pub const KIND_REPOST: u32 = 6;
/// NIP-23 long-form content.
pub const KIND_LONG_FORM_CONTENT: u32 = 30023;
/// NIP-25 reaction.
pub const KIND_REACTION: u32 = 7;
/// NIP-57 zap receipt.
pub const KIND_ZAP_RECEIPT: u32 = 9735;
/// NIP-42 client authentication event.
pub const KIND_CLIENT_AUTHENTICATION: u32 = 22242;
