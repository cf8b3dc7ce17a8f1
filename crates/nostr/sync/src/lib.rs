//! The outbox-model sync engine: given a pubkey's write and read relay
//! sets, walks backward through history on a bounded cadence, publishing
//! whatever the target relay set is missing (spec.md §1-§4).
//!
//! This crate owns the state machine only. Transport, the sighting index,
//! and NIP-42 auth live in [`nostr_client`]; wire types and id computation
//! live in [`nostr`].

pub mod config;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod identity;
pub mod progress;

pub use config::SyncConfig;
pub use engine::{SyncEngine, SyncOutcome, SyncRunError};
pub use error::{Result, SyncError};
pub use identity::{AuthPolicy, IdentityResolver, Signer};
pub use progress::{Phase, ProgressEvent};
