//! The optional auth collaborators a [`crate::RelayConnection`] consults
//! when a relay issues a NIP-42 `AUTH` challenge (spec.md §4.1, §6).
//!
//! Both are external collaborators: the engine supplies them, the
//! transport only consults them. Their absence — or a `false` policy
//! decision, or a signer error — never aborts a subscription; the relay's
//! own subsequent rejections are what the engine reacts to (spec.md §9).

use async_trait::async_trait;
use nostr::{Event, EventTemplate};

use crate::error::Result;

/// Decides whether to respond to a given relay's auth challenge at all.
pub type AuthPolicy = dyn Fn(&str, &str) -> bool + Send + Sync;

/// Signs an auth event template. Async to allow remote/hardware signers.
#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign(&self, template: EventTemplate) -> Result<Event>;
}

/// Build the kind-22242 auth event template for a given relay + challenge,
/// per NIP-42.
pub fn auth_template(relay_url: &str, challenge: &str, created_at: u64) -> EventTemplate {
    EventTemplate {
        created_at,
        kind: nostr::KIND_CLIENT_AUTHENTICATION,
        tags: vec![
            vec!["relay".to_string(), relay_url.to_string()],
            vec!["challenge".to_string(), challenge.to_string()],
        ],
        content: String::new(),
    }
}
