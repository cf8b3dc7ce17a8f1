//! External collaborators the engine consumes but never implements itself
//! (spec.md §6): identity resolution, and (re-exported) the signer and
//! auth-policy collaborators [`nostr_client::RelayConnection`] consults
//! directly when a relay issues a NIP-42 challenge.
//!
//! `Signer`/`AuthPolicy` live in `nostr-client` rather than here: the
//! transport is what actually has to await a signature mid-handshake, and
//! `nostr-sync` already depends on `nostr-client`, not the other way
//! around. Re-exporting keeps one name for callers wiring up a run.

pub use nostr_client::{AuthPolicy, Signer};

use crate::error::Result;

/// Resolves a textual identifier (e.g. an npub or NIP-05 name) to a hex
/// pubkey and optional hint relays. The engine never parses the
/// identifier itself.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, identifier: &str) -> Result<(String, Vec<String>)>;
}
