//! NIP-65 relay list model: the parsed "outbox model" relay set this
//! sync engine reconciles events against.
//!
//! Fetching and signature-verifying the NIP-65 event itself is out of
//! scope (spec.md §1 Non-goals); this module only decodes the already-
//! fetched event's `r` tags into typed [`RelayDescriptor`]s.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::event::Event;

pub const KIND_RELAY_LIST_METADATA: u32 = 10002;

/// A relay's declared role in a NIP-65 list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayRole {
    WriteOnly,
    ReadOnly,
    ReadWrite,
}

impl RelayRole {
    pub fn accepts_write(self) -> bool {
        matches!(self, RelayRole::WriteOnly | RelayRole::ReadWrite)
    }

    pub fn accepts_read(self) -> bool {
        matches!(self, RelayRole::ReadOnly | RelayRole::ReadWrite)
    }

    fn from_marker(marker: Option<&str>) -> Self {
        match marker {
            Some("write") => RelayRole::WriteOnly,
            Some("read") => RelayRole::ReadOnly,
            _ => RelayRole::ReadWrite,
        }
    }
}

impl fmt::Display for RelayRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RelayRole::WriteOnly => "write",
            RelayRole::ReadOnly => "read",
            RelayRole::ReadWrite => "read+write",
        };
        f.write_str(s)
    }
}

/// A normalized relay URL plus its declared role. Derived once from the
/// NIP-65 document and never mutated during a sync run (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayDescriptor {
    pub url: String,
    pub role: RelayRole,
}

/// Normalize a relay URL for use as a map/set key: lowercase scheme+host,
/// strip a trailing slash. Two URLs that a human would consider "the
/// same relay" should normalize identically.
pub fn normalize_relay_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    trimmed.to_string()
}

/// Parse the `r` tags of a kind-10002 event into relay descriptors.
///
/// Tag shape per NIP-65: `["r", "<url>"]` or `["r", "<url>", "write"|"read"]`.
/// Malformed tags (missing url) are skipped rather than erroring — a
/// relay list with one bad entry should not block the rest of it.
pub fn parse_nip65_tags(event: &Event) -> Vec<RelayDescriptor> {
    event
        .tags
        .iter()
        .filter(|tag| tag.first().map(String::as_str) == Some("r"))
        .filter_map(|tag| {
            let url = tag.get(1)?;
            let role = RelayRole::from_marker(tag.get(2).map(String::as_str));
            Some(RelayDescriptor {
                url: normalize_relay_url(url),
                role,
            })
        })
        .collect()
}

/// Split a relay list into write-target and read-target URL sets,
/// deduplicating by normalized URL.
pub fn split_write_read(descriptors: &[RelayDescriptor]) -> (Vec<String>, Vec<String>) {
    let mut write = Vec::new();
    let mut read = Vec::new();
    for descriptor in descriptors {
        if descriptor.role.accepts_write() {
            write.push(descriptor.url.clone());
        }
        if descriptor.role.accepts_read() {
            read.push(descriptor.url.clone());
        }
    }
    (write, read)
}
