//! NIP-01 wire framing: the JSON-array messages relays and clients exchange.
//!
//! `ClientMessage` is what `nostr-client` sends; `RelayMessage` is what it
//! parses out of incoming frames. Kept in `nostr-core` since both the
//! client and the test relay need the same framing.

use serde_json::Value;

use crate::error::{CoreError, Result};
use crate::event::Event;

/// A message sent from client to relay.
#[derive(Debug, Clone)]
pub enum ClientMessage {
    Event(Event),
    Req(String, Vec<Value>),
    Close(String),
    Auth(Event),
}

impl ClientMessage {
    pub fn to_json(&self) -> Value {
        match self {
            ClientMessage::Event(event) => serde_json::json!(["EVENT", event]),
            ClientMessage::Req(sub_id, filters) => {
                let mut array = vec![Value::String("REQ".to_string()), Value::String(sub_id.clone())];
                array.extend(filters.iter().cloned());
                Value::Array(array)
            }
            ClientMessage::Close(sub_id) => serde_json::json!(["CLOSE", sub_id]),
            ClientMessage::Auth(event) => serde_json::json!(["AUTH", event]),
        }
    }
}

/// Parse a single client-to-relay text frame. The mirror of
/// [`parse_relay_message`], used by the test relay to decode what clients
/// send it.
pub fn parse_client_message(text: &str) -> Result<Option<ClientMessage>> {
    let value: Value = serde_json::from_str(text)?;
    let array = value
        .as_array()
        .ok_or_else(|| CoreError::InvalidRelayUrl("expected JSON array client message".to_string()))?;
    if array.is_empty() {
        return Ok(None);
    }

    let kind = match array[0].as_str() {
        Some(kind) => kind,
        None => return Ok(None),
    };

    match kind {
        "EVENT" => {
            if array.len() < 2 {
                return Ok(None);
            }
            let event: Event = serde_json::from_value(array[1].clone())?;
            Ok(Some(ClientMessage::Event(event)))
        }
        "REQ" => {
            if array.len() < 2 {
                return Ok(None);
            }
            let sub_id = array[1].as_str().unwrap_or_default().to_string();
            let filters = array[2..].to_vec();
            Ok(Some(ClientMessage::Req(sub_id, filters)))
        }
        "CLOSE" => {
            if array.len() < 2 {
                return Ok(None);
            }
            Ok(Some(ClientMessage::Close(array[1].as_str().unwrap_or_default().to_string())))
        }
        "AUTH" => {
            if array.len() < 2 {
                return Ok(None);
            }
            let event: Event = serde_json::from_value(array[1].clone())?;
            Ok(Some(ClientMessage::Auth(event)))
        }
        _ => Ok(None),
    }
}

/// A message received from a relay, parsed out of the wire framing.
///
/// `closed-by-relay{reason}` from spec.md §4.1 is `Closed`; a caller-
/// initiated close never produces one (the relay only sends it
/// unilaterally or in response to an error on a `REQ`).
#[derive(Debug, Clone)]
pub enum RelayMessage {
    Event(String, Event),
    Ok(String, bool, String),
    Eose(String),
    Closed(String, String),
    Notice(String),
    Auth(String),
}

impl RelayMessage {
    /// Encode as the JSON array a relay sends over the wire. The mirror of
    /// [`ClientMessage::to_json`], used by the test relay.
    pub fn to_json(&self) -> Value {
        match self {
            RelayMessage::Event(sub_id, event) => serde_json::json!(["EVENT", sub_id, event]),
            RelayMessage::Ok(event_id, accepted, message) => {
                serde_json::json!(["OK", event_id, accepted, message])
            }
            RelayMessage::Eose(sub_id) => serde_json::json!(["EOSE", sub_id]),
            RelayMessage::Closed(sub_id, reason) => serde_json::json!(["CLOSED", sub_id, reason]),
            RelayMessage::Notice(message) => serde_json::json!(["NOTICE", message]),
            RelayMessage::Auth(challenge) => serde_json::json!(["AUTH", challenge]),
        }
    }
}

/// Parse a single relay-to-client text frame.
pub fn parse_relay_message(text: &str) -> Result<Option<RelayMessage>> {
    let value: Value = serde_json::from_str(text)?;
    let array = value
        .as_array()
        .ok_or_else(|| CoreError::InvalidRelayUrl("expected JSON array relay message".to_string()))?;
    if array.is_empty() {
        return Ok(None);
    }

    let kind = match array[0].as_str() {
        Some(kind) => kind,
        None => return Ok(None),
    };

    match kind {
        "EVENT" => {
            if array.len() < 3 {
                return Ok(None);
            }
            let sub_id = array[1].as_str().unwrap_or_default().to_string();
            let event: Event = serde_json::from_value(array[2].clone())?;
            Ok(Some(RelayMessage::Event(sub_id, event)))
        }
        "OK" => {
            if array.len() < 4 {
                return Ok(None);
            }
            let event_id = array[1].as_str().unwrap_or_default().to_string();
            let accepted = array[2].as_bool().unwrap_or(false);
            let message = array[3].as_str().unwrap_or_default().to_string();
            Ok(Some(RelayMessage::Ok(event_id, accepted, message)))
        }
        "EOSE" => {
            if array.len() < 2 {
                return Ok(None);
            }
            Ok(Some(RelayMessage::Eose(
                array[1].as_str().unwrap_or_default().to_string(),
            )))
        }
        "CLOSED" => {
            if array.len() < 3 {
                return Ok(None);
            }
            let sub_id = array[1].as_str().unwrap_or_default().to_string();
            let reason = array[2].as_str().unwrap_or_default().to_string();
            Ok(Some(RelayMessage::Closed(sub_id, reason)))
        }
        "NOTICE" => {
            if array.len() < 2 {
                return Ok(None);
            }
            Ok(Some(RelayMessage::Notice(
                array[1].as_str().unwrap_or_default().to_string(),
            )))
        }
        "AUTH" => {
            if array.len() < 2 {
                return Ok(None);
            }
            Ok(Some(RelayMessage::Auth(
                array[1].as_str().unwrap_or_default().to_string(),
            )))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> Event {
        Event {
            id: "id".to_string(),
            pubkey: "pubkey".to_string(),
            created_at: 1,
            kind: 1,
            tags: vec![],
            content: "hello".to_string(),
            sig: "sig".to_string(),
        }
    }

    #[test]
    fn parses_event_message() {
        let text = serde_json::to_string(&serde_json::json!(["EVENT", "sub", sample_event()])).unwrap();
        match parse_relay_message(&text).unwrap() {
            Some(RelayMessage::Event(sub_id, event)) => {
                assert_eq!(sub_id, "sub");
                assert_eq!(event.content, "hello");
            }
            other => panic!("unexpected: {other:?}", other = other.is_some()),
        }
    }

    #[test]
    fn parses_ok_message() {
        let text = r#"["OK","abc123",false,"rate-limited"]"#;
        match parse_relay_message(text).unwrap() {
            Some(RelayMessage::Ok(id, accepted, msg)) => {
                assert_eq!(id, "abc123");
                assert!(!accepted);
                assert_eq!(msg, "rate-limited");
            }
            _ => panic!("expected OK"),
        }
    }

    #[test]
    fn parses_closed_message() {
        let text = r#"["CLOSED","sub1","deletion: event has been deleted"]"#;
        match parse_relay_message(text).unwrap() {
            Some(RelayMessage::Closed(sub_id, reason)) => {
                assert_eq!(sub_id, "sub1");
                assert!(reason.starts_with("deletion"));
            }
            _ => panic!("expected CLOSED"),
        }
    }

    #[test]
    fn unknown_message_kind_is_ignored() {
        let text = r#"["WEIRD","x"]"#;
        assert!(parse_relay_message(text).unwrap().is_none());
    }

    #[test]
    fn client_req_message_serializes_with_filters_inline() {
        let msg = ClientMessage::Req("sub".to_string(), vec![serde_json::json!({"kinds": [1]})]);
        let json = msg.to_json();
        assert_eq!(json[0], "REQ");
        assert_eq!(json[1], "sub");
        assert_eq!(json[2]["kinds"], serde_json::json!([1]));
    }
}
