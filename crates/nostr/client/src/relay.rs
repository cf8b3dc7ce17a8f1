//! Single relay connection management (spec.md §4.1 "Relay Transport").

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use nostr::{ClientMessage, Event, RelayMessage, parse_relay_message};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

use crate::auth::{AuthPolicy, Signer, auth_template};
use crate::config::RelayConfig;
use crate::error::{ClientError, Result};
use crate::subscription::{Subscription, SubscriptionCompletion};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// A relay's response to a published event.
#[derive(Debug, Clone)]
pub struct PublishConfirmation {
    pub relay_url: String,
    pub event_id: String,
    pub accepted: bool,
    pub message: String,
}

struct AuthConfig {
    policy: Arc<AuthPolicy>,
    signer: Arc<dyn Signer>,
}

/// A websocket connection to a single relay, speaking the NIP-01 framing.
pub struct RelayConnection {
    url: Url,
    config: RelayConfig,
    state: Arc<RwLock<ConnectionState>>,
    writer: Arc<Mutex<Option<WsWriter>>>,
    incoming_tx: mpsc::UnboundedSender<RelayMessage>,
    incoming_rx: Mutex<mpsc::UnboundedReceiver<RelayMessage>>,
    subscriptions: Arc<Mutex<HashMap<String, Subscription>>>,
    pending_publishes: Arc<Mutex<HashMap<String, oneshot::Sender<PublishConfirmation>>>>,
    recv_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    auth: Option<AuthConfig>,
}

impl RelayConnection {
    pub fn new(url: &str) -> Result<Self> {
        Self::with_config(url, RelayConfig::default())
    }

    pub fn with_config(url: &str, config: RelayConfig) -> Result<Self> {
        let parsed_url = Url::parse(url).map_err(|error| ClientError::InvalidUrl(error.to_string()))?;
        if parsed_url.scheme() != "ws" && parsed_url.scheme() != "wss" {
            return Err(ClientError::InvalidUrl(format!(
                "URL must use ws:// or wss:// scheme, got: {}",
                parsed_url.scheme()
            )));
        }

        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();

        Ok(Self {
            url: parsed_url,
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            writer: Arc::new(Mutex::new(None)),
            incoming_tx,
            incoming_rx: Mutex::new(incoming_rx),
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
            pending_publishes: Arc::new(Mutex::new(HashMap::new())),
            recv_task: Mutex::new(None),
            auth: None,
        })
    }

    /// Attach an auth policy + signer so NIP-42 `AUTH` challenges get answered.
    pub fn with_auth(mut self, policy: Arc<AuthPolicy>, signer: Arc<dyn Signer>) -> Self {
        self.auth = Some(AuthConfig { policy, signer });
        self
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Connect to the relay and start the background receive loop.
    pub async fn connect(&self) -> Result<()> {
        let mut state_guard = self.state.write().await;
        if *state_guard == ConnectionState::Connected {
            return Err(ClientError::AlreadyConnected);
        }
        *state_guard = ConnectionState::Connecting;
        drop(state_guard);

        let connect_result = timeout(self.config.connect_timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| ClientError::Timeout(self.config.connect_timeout))?
            .map_err(|error| ClientError::ConnectFailed(error.to_string()))?;

        let (stream, _response) = connect_result;
        let (writer, mut reader) = stream.split();
        *self.writer.lock().await = Some(writer);
        *self.state.write().await = ConnectionState::Connected;

        let incoming_tx = self.incoming_tx.clone();
        let subscriptions = Arc::clone(&self.subscriptions);
        let pending_publishes = Arc::clone(&self.pending_publishes);
        let state = Arc::clone(&self.state);
        let writer_for_task = Arc::clone(&self.writer);
        let relay_url = self.url.to_string();
        let auth_policy = self.auth.as_ref().map(|a| Arc::clone(&a.policy));
        let auth_signer = self.auth.as_ref().map(|a| Arc::clone(&a.signer));

        let task = tokio::spawn(async move {
            while let Some(frame) = reader.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        match parse_relay_message(text.as_str()) {
                            Ok(Some(RelayMessage::Event(sub_id, event))) => {
                                if let Some(sub) = subscriptions.lock().await.get(&sub_id).cloned() {
                                    sub.handle_event(event.clone());
                                }
                                if incoming_tx.send(RelayMessage::Event(sub_id, event)).is_err() {
                                    break;
                                }
                            }
                            Ok(Some(RelayMessage::Eose(sub_id))) => {
                                if let Some(sub) = subscriptions.lock().await.get(&sub_id).cloned() {
                                    sub.mark_eose();
                                }
                                if incoming_tx.send(RelayMessage::Eose(sub_id)).is_err() {
                                    break;
                                }
                            }
                            Ok(Some(RelayMessage::Closed(sub_id, reason))) => {
                                if let Some(sub) = subscriptions.lock().await.remove(&sub_id) {
                                    sub.mark_closed(reason.clone());
                                }
                                if incoming_tx.send(RelayMessage::Closed(sub_id, reason)).is_err() {
                                    break;
                                }
                            }
                            Ok(Some(RelayMessage::Ok(event_id, accepted, message))) => {
                                if let Some(sender) = pending_publishes.lock().await.remove(&event_id) {
                                    let _ = sender.send(PublishConfirmation {
                                        relay_url: relay_url.clone(),
                                        event_id: event_id.clone(),
                                        accepted,
                                        message: message.clone(),
                                    });
                                }
                                if incoming_tx
                                    .send(RelayMessage::Ok(event_id, accepted, message))
                                    .is_err()
                                {
                                    break;
                                }
                            }
                            Ok(Some(RelayMessage::Auth(challenge))) => {
                                if let (Some(policy), Some(signer)) = (&auth_policy, &auth_signer) {
                                    if policy(&relay_url, &challenge) {
                                        let created_at = std::time::SystemTime::now()
                                            .duration_since(std::time::UNIX_EPOCH)
                                            .map(|d| d.as_secs())
                                            .unwrap_or(0);
                                        let template = auth_template(&relay_url, &challenge, created_at);
                                        match signer.sign(template).await {
                                            Ok(event) => {
                                                let payload = ClientMessage::Auth(event).to_json();
                                                if let Ok(text) = serde_json::to_string(&payload) {
                                                    if let Some(writer) = writer_for_task.lock().await.as_mut() {
                                                        let _ = writer.send(Message::Text(text.into())).await;
                                                    }
                                                }
                                            }
                                            Err(error) => {
                                                warn!("auth signing failed on {}: {}", relay_url, error);
                                            }
                                        }
                                    }
                                }
                                if incoming_tx.send(RelayMessage::Auth(challenge)).is_err() {
                                    break;
                                }
                            }
                            Ok(Some(message)) => {
                                if incoming_tx.send(message).is_err() {
                                    break;
                                }
                            }
                            Ok(None) => {}
                            Err(error) => {
                                warn!("protocol parse error on {}: {}", relay_url, error);
                            }
                        }
                    }
                    Ok(Message::Ping(payload)) => {
                        debug!("received ping from {} ({} bytes)", relay_url, payload.len());
                    }
                    Ok(Message::Pong(_)) => {}
                    Ok(Message::Close(_)) => break,
                    Ok(Message::Binary(_)) => {}
                    Ok(Message::Frame(_)) => {}
                    Err(error) => {
                        warn!("websocket read error on {}: {}", relay_url, error);
                        break;
                    }
                }
            }

            *state.write().await = ConnectionState::Disconnected;
            pending_publishes.lock().await.clear();
        });

        *self.recv_task.lock().await = Some(task);
        Ok(())
    }

    /// Disconnect and stop the background receive loop.
    pub async fn disconnect(&self) -> Result<()> {
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.send(Message::Close(None)).await;
        }

        if let Some(task) = self.recv_task.lock().await.take() {
            task.abort();
        }

        *self.state.write().await = ConnectionState::Disconnected;
        self.pending_publishes.lock().await.clear();
        Ok(())
    }

    /// Send `EVENT` without waiting for the relay's acknowledgment.
    pub async fn publish(&self, event: &Event) -> Result<()> {
        self.send_json(&ClientMessage::Event(event.clone()).to_json()).await
    }

    /// Publish and await the correlated `OK` frame, per spec.md §4.1.
    pub async fn publish_event(&self, event: &Event, wait: Duration) -> Result<PublishConfirmation> {
        if self.state().await != ConnectionState::Connected {
            return Err(ClientError::NotConnected);
        }

        let (tx, rx) = oneshot::channel();
        self.pending_publishes.lock().await.insert(event.id.clone(), tx);

        if let Err(error) = self.publish(event).await {
            self.pending_publishes.lock().await.remove(&event.id);
            return Err(error);
        }

        match timeout(wait, rx).await {
            Ok(Ok(confirmation)) => Ok(confirmation),
            Ok(Err(_)) => Err(ClientError::WebSocket("connection closed before OK".to_string())),
            Err(_) => {
                self.pending_publishes.lock().await.remove(&event.id);
                Err(ClientError::PublishTimeout {
                    relay: self.url.to_string(),
                })
            }
        }
    }

    /// Register and send a `REQ`. Events arrive via [`Self::recv`].
    pub async fn subscribe(&self, sub_id: &str, filters: &[Value]) -> Result<()> {
        self.send_req(sub_id, filters).await?;
        let subscription = Subscription::new(sub_id.to_string(), filters.to_vec());
        self.subscriptions.lock().await.insert(sub_id.to_string(), subscription);
        Ok(())
    }

    /// Register and send a `REQ`, returning a dedicated event stream.
    pub async fn subscribe_with_channel(
        &self,
        sub_id: &str,
        filters: &[Value],
    ) -> Result<mpsc::UnboundedReceiver<Event>> {
        self.send_req(sub_id, filters).await?;
        let (subscription, rx) = Subscription::with_channel(sub_id.to_string(), filters.to_vec());
        self.subscriptions.lock().await.insert(sub_id.to_string(), subscription);
        Ok(rx)
    }

    /// Register and send a `REQ`, returning both an event stream and a
    /// one-shot signal for this relay's completion (`EOSE` or relay-closed),
    /// used by the batch fetcher (spec.md §4.3) to know when this relay is
    /// done answering.
    pub async fn subscribe_batch(
        &self,
        sub_id: &str,
        filters: &[Value],
    ) -> Result<(mpsc::UnboundedReceiver<Event>, oneshot::Receiver<SubscriptionCompletion>)> {
        self.send_req(sub_id, filters).await?;
        let (subscription, rx, completion_rx) =
            Subscription::with_channel_and_completion(sub_id.to_string(), filters.to_vec());
        self.subscriptions.lock().await.insert(sub_id.to_string(), subscription);
        Ok((rx, completion_rx))
    }

    async fn send_req(&self, sub_id: &str, filters: &[Value]) -> Result<()> {
        let message = ClientMessage::Req(sub_id.to_string(), filters.to_vec());
        self.send_json(&message.to_json()).await
    }

    /// Cooperatively close a subscription. Idempotent: closing an unknown
    /// subscription id is not an error (spec.md §4.1).
    pub async fn close_subscription(&self, sub_id: &str) -> Result<()> {
        self.subscriptions.lock().await.remove(sub_id);
        if self.state().await != ConnectionState::Connected {
            return Ok(());
        }
        self.send_json(&ClientMessage::Close(sub_id.to_string()).to_json()).await
    }

    /// Whether this relay's connection has reported EOSE for `sub_id`.
    pub async fn has_seen_eose(&self, sub_id: &str) -> bool {
        self.subscriptions
            .lock()
            .await
            .get(sub_id)
            .map(Subscription::has_seen_eose)
            .unwrap_or(false)
    }

    /// Receive the next raw multiplexed message from this relay.
    pub async fn recv(&self) -> Result<Option<RelayMessage>> {
        Ok(self.incoming_rx.lock().await.recv().await)
    }

    async fn send_json(&self, value: &Value) -> Result<()> {
        if self.state().await != ConnectionState::Connected {
            return Err(ClientError::NotConnected);
        }
        let text = serde_json::to_string(value)?;
        let mut writer_guard = self.writer.lock().await;
        let writer = writer_guard.as_mut().ok_or(ClientError::NotConnected)?;
        writer
            .send(Message::Text(text.into()))
            .await
            .map_err(|error| ClientError::WebSocket(error.to_string()))
    }
}
