//! A single relay-local subscription: its filters, and where its events go.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use nostr::Event;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

/// How a subscription ended, for callers that need to distinguish a clean
/// end-of-stored-events from a relay-initiated close (spec.md §4.1/§4.3).
#[derive(Debug, Clone)]
pub enum SubscriptionCompletion {
    Eose,
    Closed(String),
}

/// A live `REQ` on one [`crate::RelayConnection`].
#[derive(Clone)]
pub struct Subscription {
    pub id: String,
    pub filters: Vec<Value>,
    event_tx: Option<mpsc::UnboundedSender<Event>>,
    eose_seen: Arc<AtomicBool>,
    completion_tx: Arc<Mutex<Option<oneshot::Sender<SubscriptionCompletion>>>>,
}

impl Subscription {
    pub fn new(id: String, filters: Vec<Value>) -> Self {
        Self {
            id,
            filters,
            event_tx: None,
            eose_seen: Arc::new(AtomicBool::new(false)),
            completion_tx: Arc::new(Mutex::new(None)),
        }
    }

    /// Create a subscription with a dedicated event-only channel, for
    /// callers that want this subscription's events without sifting
    /// through the connection's raw multiplexed [`crate::RelayMessage`] stream.
    pub fn with_channel(id: String, filters: Vec<Value>) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscription = Self::new(id, filters);
        subscription.event_tx = Some(tx);
        (subscription, rx)
    }

    /// Like [`Self::with_channel`], plus a one-shot signal fired the first
    /// time this subscription sees an `EOSE` or a relay-initiated `CLOSED`
    /// (used by the batch fetcher to know when a relay is done answering).
    pub fn with_channel_and_completion(
        id: String,
        filters: Vec<Value>,
    ) -> (Self, mpsc::UnboundedReceiver<Event>, oneshot::Receiver<SubscriptionCompletion>) {
        let (subscription, rx) = Self::with_channel(id, filters);
        let (completion_tx, completion_rx) = oneshot::channel();
        *subscription.completion_tx.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(completion_tx);
        (subscription, rx, completion_rx)
    }

    pub(crate) fn handle_event(&self, event: Event) {
        if let Some(tx) = &self.event_tx {
            // A closed receiver just means the caller dropped their
            // handle; the connection keeps delivering to `recv()` regardless.
            let _ = tx.send(event);
        }
    }

    pub(crate) fn mark_eose(&self) {
        self.eose_seen.store(true, Ordering::SeqCst);
        let taken = self
            .completion_tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(tx) = taken {
            let _ = tx.send(SubscriptionCompletion::Eose);
        }
    }

    pub(crate) fn mark_closed(&self, reason: String) {
        let taken = self
            .completion_tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(tx) = taken {
            let _ = tx.send(SubscriptionCompletion::Closed(reason));
        }
    }

    pub fn has_seen_eose(&self) -> bool {
        self.eose_seen.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_eose_is_observable() {
        let sub = Subscription::new("s".to_string(), vec![]);
        assert!(!sub.has_seen_eose());
        sub.mark_eose();
        assert!(sub.has_seen_eose());
    }

    #[tokio::test]
    async fn channel_subscription_forwards_events() {
        let (sub, mut rx) = Subscription::with_channel("s".to_string(), vec![]);
        let event = Event {
            id: "id".to_string(),
            pubkey: "pk".to_string(),
            created_at: 1,
            kind: 1,
            tags: vec![],
            content: "hi".to_string(),
            sig: "sig".to_string(),
        };
        sub.handle_event(event.clone());
        let received = rx.recv().await.unwrap();
        assert_eq!(received.id, event.id);
    }

    #[tokio::test]
    async fn completion_fires_once_on_eose() {
        let (sub, _rx, completion_rx) = Subscription::with_channel_and_completion("s".to_string(), vec![]);
        sub.mark_eose();
        match completion_rx.await.unwrap() {
            SubscriptionCompletion::Eose => {}
            SubscriptionCompletion::Closed(_) => panic!("expected Eose"),
        }
    }

    #[tokio::test]
    async fn completion_fires_once_on_closed() {
        let (sub, _rx, completion_rx) = Subscription::with_channel_and_completion("s".to_string(), vec![]);
        sub.mark_closed("rate-limited".to_string());
        match completion_rx.await.unwrap() {
            SubscriptionCompletion::Closed(reason) => assert_eq!(reason, "rate-limited"),
            SubscriptionCompletion::Eose => panic!("expected Closed"),
        }
    }
}
