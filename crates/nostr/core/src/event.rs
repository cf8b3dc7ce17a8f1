//! NIP-01 event type, signing template, and id computation.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CoreError, Result};

/// An immutable Nostr event as received from or published to a relay.
///
/// The sync engine treats every field except `id`, `created_at`, `kind`,
/// `pubkey`, and the `p`-tags as opaque (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub pubkey: String,
    pub created_at: u64,
    pub kind: u32,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    pub sig: String,
}

impl Event {
    /// Pubkeys referenced via `p` tags (the "mentions" this event carries).
    pub fn p_tags(&self) -> impl Iterator<Item = &str> {
        self.tags
            .iter()
            .filter(|tag| tag.first().map(String::as_str) == Some("p"))
            .filter_map(|tag| tag.get(1))
            .map(String::as_str)
    }
}

/// An unsigned event, ready to be hashed and signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTemplate {
    pub created_at: u64,
    pub kind: u32,
    pub tags: Vec<Vec<String>>,
    pub content: String,
}

/// Compute the NIP-01 event id: the hex-encoded SHA-256 of the canonical
/// `[0, pubkey, created_at, kind, tags, content]` serialization.
///
/// This is a pure function of its inputs — same inputs always yield the
/// same id, regardless of what order the caller built the template in.
pub fn compute_id(pubkey: &str, template: &EventTemplate) -> String {
    let value = serde_json::json!([
        0,
        pubkey,
        template.created_at,
        template.kind,
        template.tags,
        template.content,
    ]);
    // NIP-01 mandates compact, unescaped-where-possible JSON for the
    // id preimage; serde_json's default compact formatting matches it.
    let serialized = serde_json::to_string(&value).expect("json array always serializes");
    let digest = Sha256::digest(serialized.as_bytes());
    hex::encode(digest)
}

/// Build an [`Event`] from a template and a pubkey/signature pair without
/// verifying anything about the signature — used when the caller already
/// has a signed event (e.g. one delivered by a relay) and only needs the
/// id recomputed or checked.
pub fn event_with_id(pubkey: String, template: EventTemplate, sig: String) -> Event {
    let id = compute_id(&pubkey, &template);
    Event {
        id,
        pubkey,
        created_at: template.created_at,
        kind: template.kind,
        tags: template.tags,
        content: template.content,
        sig,
    }
}

/// Verify that an event's `id` field matches its content (cheap, no signature check).
pub fn verify_id(event: &Event) -> Result<()> {
    let template = EventTemplate {
        created_at: event.created_at,
        kind: event.kind,
        tags: event.tags.clone(),
        content: event.content.clone(),
    };
    let expected = compute_id(&event.pubkey, &template);
    if expected != event.id {
        return Err(CoreError::IdMismatch {
            expected,
            actual: event.id.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_deterministic() {
        let template = EventTemplate {
            created_at: 100,
            kind: 1,
            tags: vec![],
            content: "hello".to_string(),
        };
        let id1 = compute_id("abc", &template);
        let id2 = compute_id("abc", &template);
        assert_eq!(id1, id2);
        assert_eq!(id1.len(), 64);
    }

    #[test]
    fn id_changes_with_content() {
        let base = EventTemplate {
            created_at: 100,
            kind: 1,
            tags: vec![],
            content: "hello".to_string(),
        };
        let mut changed = base.clone();
        changed.content = "world".to_string();
        assert_ne!(compute_id("abc", &base), compute_id("abc", &changed));
    }

    #[test]
    fn p_tags_extracts_referenced_pubkeys() {
        let event = Event {
            id: "id".to_string(),
            pubkey: "pk".to_string(),
            created_at: 1,
            kind: 1,
            tags: vec![
                vec!["p".to_string(), "alice".to_string()],
                vec!["e".to_string(), "someevent".to_string()],
                vec!["p".to_string(), "bob".to_string()],
            ],
            content: String::new(),
            sig: "sig".to_string(),
        };
        let ps: Vec<&str> = event.p_tags().collect();
        assert_eq!(ps, vec!["alice", "bob"]);
    }

    #[test]
    fn verify_id_detects_tampering() {
        let template = EventTemplate {
            created_at: 1,
            kind: 1,
            tags: vec![],
            content: "x".to_string(),
        };
        let mut event = event_with_id("pk".to_string(), template, "sig".to_string());
        assert!(verify_id(&event).is_ok());
        event.content = "tampered".to_string();
        assert!(verify_id(&event).is_err());
    }
}
