//! NIP-01 filter: the structured query used for both `REQ` subscriptions
//! and in-process filter matching (used by the test relay).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::event::Event;

/// Recognized NIP-01 filter fields, per spec.md §3.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(skip_serializing_if = "BTreeSet::is_empty", default)]
    pub authors: BTreeSet<String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty", default)]
    pub kinds: BTreeSet<u32>,
    #[serde(rename = "#p", skip_serializing_if = "BTreeSet::is_empty", default)]
    pub p_tags: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub since: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub until: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub limit: Option<u32>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_authors(mut self, authors: impl IntoIterator<Item = String>) -> Self {
        self.authors = authors.into_iter().collect();
        self
    }

    pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = u32>) -> Self {
        self.kinds = kinds.into_iter().collect();
        self
    }

    pub fn with_p_tags(mut self, pubkeys: impl IntoIterator<Item = String>) -> Self {
        self.p_tags = pubkeys.into_iter().collect();
        self
    }

    pub fn with_until(mut self, until: u64) -> Self {
        self.until = Some(until);
        self
    }

    pub fn with_since(mut self, since: u64) -> Self {
        self.since = Some(since);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The write filter from spec.md §3: events authored by `pubkey`.
    pub fn write_filter(pubkey: &str) -> Self {
        Self::new()
            .with_authors([pubkey.to_string()])
            .with_kinds([1, 6, 30023])
    }

    /// The read filter from spec.md §3: events mentioning `pubkey`.
    pub fn read_filter(pubkey: &str) -> Self {
        Self::new()
            .with_p_tags([pubkey.to_string()])
            .with_kinds([1, 6, 7, 9735])
    }

    /// Whether `event` matches this filter, per NIP-01 semantics (all
    /// present fields AND together; each field's values OR together).
    pub fn matches(&self, event: &Event) -> bool {
        if !self.authors.is_empty() && !self.authors.contains(&event.pubkey) {
            return false;
        }
        if !self.kinds.is_empty() && !self.kinds.contains(&event.kind) {
            return false;
        }
        if !self.p_tags.is_empty() {
            let matches_p = event.p_tags().any(|p| self.p_tags.contains(p));
            if !matches_p {
                return false;
            }
        }
        if let Some(since) = self.since
            && event.created_at < since
        {
            return false;
        }
        if let Some(until) = self.until
            && event.created_at >= until
        {
            return false;
        }
        true
    }

    pub fn to_json(&self) -> Value {
        json!(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(pubkey: &str, kind: u32, created_at: u64, tags: Vec<Vec<String>>) -> Event {
        Event {
            id: "id".to_string(),
            pubkey: pubkey.to_string(),
            created_at,
            kind,
            tags,
            content: String::new(),
            sig: "sig".to_string(),
        }
    }

    #[test]
    fn write_filter_matches_authored_events() {
        let filter = Filter::write_filter("alice");
        assert!(filter.matches(&event("alice", 1, 100, vec![])));
        assert!(!filter.matches(&event("bob", 1, 100, vec![])));
        assert!(!filter.matches(&event("alice", 4, 100, vec![])));
    }

    #[test]
    fn read_filter_matches_mentions() {
        let filter = Filter::read_filter("alice");
        let tags = vec![vec!["p".to_string(), "alice".to_string()]];
        assert!(filter.matches(&event("bob", 1, 100, tags)));
        assert!(!filter.matches(&event("bob", 1, 100, vec![])));
    }

    #[test]
    fn until_is_exclusive_since_is_inclusive() {
        let filter = Filter::new().with_since(100).with_until(200);
        assert!(filter.matches(&event("a", 1, 100, vec![])));
        assert!(filter.matches(&event("a", 1, 199, vec![])));
        assert!(!filter.matches(&event("a", 1, 200, vec![])));
        assert!(!filter.matches(&event("a", 1, 99, vec![])));
    }

    #[test]
    fn serializes_to_nip01_wire_shape() {
        let filter = Filter::write_filter("alice").with_until(500).with_limit(20);
        let json = filter.to_json();
        assert_eq!(json["authors"], serde_json::json!(["alice"]));
        assert_eq!(json["until"], 500);
        assert_eq!(json["limit"], 20);
        assert!(json.get("#p").is_none());
    }
}
