//! Multi-relay fan-out and the cross-relay sighting index (spec.md §4.2).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use nostr::Event;
use serde_json::Value;
use tokio::sync::{RwLock, mpsc};
use tracing::warn;

use crate::auth::{AuthPolicy, Signer};
use crate::config::PoolConfig;
use crate::error::{ClientError, Result};
use crate::relay::{ConnectionState, PublishConfirmation, RelayConnection};
use crate::subscription::SubscriptionCompletion;

/// How a single relay ended its part of a [`BatchSubscription`].
#[derive(Debug, Clone)]
pub enum RelayCompletion {
    Eose,
    Closed(String),
}

/// A fan-out subscription across a fixed relay set, used by the batch
/// fetcher (spec.md §4.2's "batch handle", §4.3). Unlike [`RelayPool::subscribe`],
/// this does not deduplicate events across relays — the fetcher needs every
/// sighting, not a merged stream.
pub struct BatchSubscription {
    pub events: mpsc::UnboundedReceiver<Event>,
    completions: mpsc::UnboundedReceiver<(String, RelayCompletion)>,
    expected: usize,
}

/// The result of draining a [`BatchSubscription`] to completion or timeout.
#[derive(Debug)]
pub struct BatchResult {
    pub events: Vec<Event>,
    pub timed_out: bool,
    pub completions: Vec<(String, RelayCompletion)>,
}

impl BatchSubscription {
    /// How many relays this batch fanned out to (the connected subset of
    /// the requested `target_urls`).
    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Accumulate every event and every relay's completion until all
    /// targeted relays have completed or `deadline` elapses, whichever
    /// comes first.
    pub async fn drain(mut self, deadline: Duration) -> BatchResult {
        let mut events = Vec::new();
        let mut completions = Vec::new();
        let timed_out;
        let sleep = tokio::time::sleep(deadline);
        tokio::pin!(sleep);

        loop {
            if completions.len() >= self.expected {
                timed_out = false;
                break;
            }
            tokio::select! {
                maybe_event = self.events.recv() => {
                    if let Some(event) = maybe_event {
                        events.push(event);
                    }
                }
                maybe_completion = self.completions.recv() => {
                    match maybe_completion {
                        Some(item) => completions.push(item),
                        None => {
                            timed_out = false;
                            break;
                        }
                    }
                }
                _ = &mut sleep => {
                    timed_out = true;
                    break;
                }
            }
        }

        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }

        BatchResult {
            events,
            timed_out,
            completions,
        }
    }
}

/// A snapshot of how many relays are registered vs. actually connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub total_relays: usize,
    pub connected_relays: usize,
}

/// Fans a subscription or publish out across every relay added to it, and
/// tracks which relays have reported which event ids so the sync engine
/// never has to ask "have I seen this event before" on its own.
pub struct RelayPool {
    config: PoolConfig,
    relays: RwLock<HashMap<String, Arc<RelayConnection>>>,
    sighting_index: Arc<RwLock<HashMap<String, HashSet<String>>>>,
}

impl RelayPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            relays: RwLock::new(HashMap::new()),
            sighting_index: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn add_relay(&self, url: &str) -> Result<()> {
        let relay = RelayConnection::with_config(url, self.config.relay_config.clone())?;
        self.relays.write().await.insert(url.to_string(), Arc::new(relay));
        Ok(())
    }

    /// Register a relay that answers NIP-42 `AUTH` challenges.
    pub async fn add_relay_with_auth(
        &self,
        url: &str,
        policy: Arc<AuthPolicy>,
        signer: Arc<dyn Signer>,
    ) -> Result<()> {
        let relay = RelayConnection::with_config(url, self.config.relay_config.clone())?.with_auth(policy, signer);
        self.relays.write().await.insert(url.to_string(), Arc::new(relay));
        Ok(())
    }

    /// Connect to every registered relay. Individual failures are logged
    /// and do not prevent the pool from being usable with whatever subset
    /// of relays did connect — the outbox model expects partial reachability.
    pub async fn connect_all(&self) -> Result<()> {
        let relays = self.relays.read().await;
        if relays.is_empty() {
            return Err(ClientError::NoRelays);
        }
        for (url, relay) in relays.iter() {
            if let Err(error) = relay.connect().await {
                warn!("failed to connect to {}: {}", url, error);
            }
        }
        Ok(())
    }

    pub async fn disconnect_all(&self) -> Result<()> {
        let relays = self.relays.read().await;
        for relay in relays.values() {
            let _ = relay.disconnect().await;
        }
        Ok(())
    }

    pub async fn pool_stats(&self) -> PoolStats {
        let relays = self.relays.read().await;
        let mut connected = 0;
        for relay in relays.values() {
            if relay.state().await == ConnectionState::Connected {
                connected += 1;
            }
        }
        PoolStats {
            total_relays: relays.len(),
            connected_relays: connected,
        }
    }

    pub async fn connected_relays(&self) -> Vec<String> {
        let relays = self.relays.read().await;
        let mut urls = Vec::new();
        for (url, relay) in relays.iter() {
            if relay.state().await == ConnectionState::Connected {
                urls.push(url.clone());
            }
        }
        urls
    }

    /// Subscribe on every connected relay and merge the results into one
    /// stream, forwarding each distinct event id only once regardless of
    /// how many relays report it. Every sighting is still recorded.
    pub async fn subscribe(&self, sub_id: &str, filters: &[Value]) -> Result<mpsc::UnboundedReceiver<Event>> {
        let relays = self.relays.read().await;
        if relays.is_empty() {
            return Err(ClientError::NoRelays);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let mut any_connected = false;

        for (url, relay) in relays.iter() {
            if relay.state().await != ConnectionState::Connected {
                continue;
            }
            any_connected = true;

            let mut per_relay_rx = relay.subscribe_with_channel(sub_id, filters).await?;
            let tx = tx.clone();
            let sighting_index = Arc::clone(&self.sighting_index);
            let relay_url = url.clone();

            tokio::spawn(async move {
                while let Some(event) = per_relay_rx.recv().await {
                    let mut index = sighting_index.write().await;
                    let seen_before = index.contains_key(&event.id);
                    index.entry(event.id.clone()).or_default().insert(relay_url.clone());
                    drop(index);

                    if !seen_before && tx.send(event).is_err() {
                        break;
                    }
                }
            });
        }

        if !any_connected {
            return Err(ClientError::NoRelays);
        }
        Ok(rx)
    }

    /// Subscribe against exactly `target_urls` (relays outside that set,
    /// even if registered, are left alone), without deduplicating events
    /// across relays. See [`BatchSubscription`].
    pub async fn subscribe_batch(
        &self,
        sub_id: &str,
        filters: &[Value],
        target_urls: &[String],
    ) -> Result<BatchSubscription> {
        let relays = self.relays.read().await;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let mut expected = 0usize;

        for url in target_urls {
            let relay = match relays.get(url) {
                Some(relay) => relay,
                None => continue,
            };
            if relay.state().await != ConnectionState::Connected {
                continue;
            }
            expected += 1;

            let (mut per_relay_rx, completion) = relay.subscribe_batch(sub_id, filters).await?;
            let events_tx = events_tx.clone();
            let completion_tx = completion_tx.clone();
            let sighting_index = Arc::clone(&self.sighting_index);
            let relay_url = url.clone();

            tokio::spawn(async move {
                let mut completion = completion;
                let outcome = loop {
                    tokio::select! {
                        received = per_relay_rx.recv() => {
                            match received {
                                Some(event) => {
                                    sighting_index
                                        .write()
                                        .await
                                        .entry(event.id.clone())
                                        .or_default()
                                        .insert(relay_url.clone());
                                    let _ = events_tx.send(event);
                                }
                                None => break RelayCompletion::Closed("connection lost".to_string()),
                            }
                        }
                        result = &mut completion => {
                            // EOSE doesn't mean no more events could ever
                            // arrive on a long-lived subscription, but a
                            // batch fetch always closes right after this;
                            // drain what's already buffered, then stop.
                            while let Ok(event) = per_relay_rx.try_recv() {
                                sighting_index
                                    .write()
                                    .await
                                    .entry(event.id.clone())
                                    .or_default()
                                    .insert(relay_url.clone());
                                let _ = events_tx.send(event);
                            }
                            break match result {
                                Ok(SubscriptionCompletion::Eose) => RelayCompletion::Eose,
                                Ok(SubscriptionCompletion::Closed(reason)) => RelayCompletion::Closed(reason),
                                Err(_) => RelayCompletion::Closed("connection lost".to_string()),
                            };
                        }
                    }
                };
                let _ = completion_tx.send((relay_url, outcome));
            });
        }

        if expected == 0 {
            return Err(ClientError::NoRelays);
        }

        Ok(BatchSubscription {
            events: events_rx,
            completions: completion_rx,
            expected,
        })
    }

    pub async fn unsubscribe(&self, sub_id: &str) -> Result<()> {
        let relays = self.relays.read().await;
        for relay in relays.values() {
            let _ = relay.close_subscription(sub_id).await;
        }
        Ok(())
    }

    /// Publish to every connected relay and wait for each one's correlated
    /// `OK`. Returns one [`PublishConfirmation`] per relay that answered;
    /// a relay that timed out or errored is simply absent from the result,
    /// which the caller checks against [`PoolConfig::min_write_confirmations`].
    pub async fn publish(&self, event: &Event) -> Result<Vec<PublishConfirmation>> {
        let relays = self.relays.read().await;
        let connected: Vec<Arc<RelayConnection>> = {
            let mut out = Vec::new();
            for relay in relays.values() {
                if relay.state().await == ConnectionState::Connected {
                    out.push(Arc::clone(relay));
                }
            }
            out
        };
        drop(relays);

        if connected.is_empty() {
            return Err(ClientError::NoRelays);
        }

        let timeout = self.config.publish_timeout;
        let futures = connected
            .into_iter()
            .map(|relay| async move { relay.publish_event(event, timeout).await });
        let results = futures_util::future::join_all(futures).await;

        let confirmations: Vec<PublishConfirmation> = results
            .into_iter()
            .filter_map(|result| match result {
                Ok(confirmation) => Some(confirmation),
                Err(error) => {
                    warn!("publish failed: {}", error);
                    None
                }
            })
            .collect();

        self.record_accepted_sightings(event, &confirmations).await;

        if confirmations.len() < self.config.min_write_confirmations {
            return Err(ClientError::InsufficientConfirmations {
                target: self.config.min_write_confirmations,
                confirmed: confirmations.len(),
                required: self.config.min_write_confirmations,
            });
        }

        Ok(confirmations)
    }

    /// Publish to exactly `target_urls` (relays outside that set, even if
    /// registered, are left alone), waiting up to `timeout` per relay.
    /// Unlike [`Self::publish`], this never errors on partial coverage —
    /// the caller (the sync engine) decides what "enough" means for this
    /// specific publish.
    pub async fn publish_to(&self, event: &Event, target_urls: &[String], timeout: Duration) -> Result<Vec<PublishConfirmation>> {
        let relays = self.relays.read().await;
        let mut targeted = Vec::new();
        for url in target_urls {
            if let Some(relay) = relays.get(url)
                && relay.state().await == ConnectionState::Connected
            {
                targeted.push(Arc::clone(relay));
            }
        }
        drop(relays);

        if targeted.is_empty() {
            return Err(ClientError::NoRelays);
        }

        let futures = targeted.into_iter().map(|relay| async move { relay.publish_event(event, timeout).await });
        let results = futures_util::future::join_all(futures).await;

        let confirmations: Vec<PublishConfirmation> = results
            .into_iter()
            .filter_map(|result| match result {
                Ok(confirmation) => Some(confirmation),
                Err(error) => {
                    warn!("publish failed: {}", error);
                    None
                }
            })
            .collect();

        self.record_accepted_sightings(event, &confirmations).await;

        Ok(confirmations)
    }

    /// Add every relay that accepted `event` to its sighting entry (spec.md
    /// §3 Invariant 4: "After a successful publication to R, R is added to
    /// E's sighting entry before proceeding").
    async fn record_accepted_sightings(&self, event: &Event, confirmations: &[PublishConfirmation]) {
        let accepted: Vec<&PublishConfirmation> = confirmations.iter().filter(|confirmation| confirmation.accepted).collect();
        if accepted.is_empty() {
            return;
        }
        let mut index = self.sighting_index.write().await;
        let entry = index.entry(event.id.clone()).or_default();
        for confirmation in accepted {
            entry.insert(confirmation.relay_url.clone());
        }
    }

    /// Whether `event_id` has been sighted on any relay in this pool.
    pub async fn has_sighted(&self, event_id: &str) -> bool {
        self.sighting_index.read().await.contains_key(event_id)
    }

    /// Which relays have reported `event_id`, if any.
    pub async fn sighted_on(&self, event_id: &str) -> Vec<String> {
        self.sighting_index
            .read()
            .await
            .get(event_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }
}
