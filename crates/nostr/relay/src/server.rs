//! A minimal NIP-01 relay, used to drive the sync engine's tests against a
//! real websocket server instead of mocks.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use governor::{Quota, RateLimiter};
use nostr::{ClientMessage, Event, RelayMessage, parse_client_message};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use warp::Filter as WarpFilter;
use warp::ws::{Message as WsMessage, WebSocket};

use crate::config::RelayConfig;
use crate::db::Database;
use crate::error::Result;

type Limiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

type RejectPolicy = dyn Fn(&Event) -> Option<String> + Send + Sync;

/// A running test relay. Dropping this only stops accepting new
/// connections once [`Self::run`]'s returned task is aborted; call
/// [`RelayServer::run`] and hold onto the [`JoinHandle`] to manage its
/// lifetime explicitly.
pub struct RelayServer {
    config: RelayConfig,
    db: Arc<Database>,
    limiter: Arc<Limiter>,
    reject_policy: Option<Arc<RejectPolicy>>,
}

impl RelayServer {
    pub fn new(config: RelayConfig, db: Arc<Database>) -> Self {
        let limiter = Arc::new(RateLimiter::direct(Quota::per_second(config.rate_limit_per_sec)));
        Self {
            config,
            db,
            limiter,
            reject_policy: None,
        }
    }

    /// Make every published event that `policy` returns `Some(reason)` for
    /// come back as `OK false reason` instead of being stored. Lets tests
    /// simulate a relay rejecting specific events (rate limits, deletions,
    /// policy bans) without faking the wire protocol.
    pub fn with_reject_policy(mut self, policy: impl Fn(&Event) -> Option<String> + Send + Sync + 'static) -> Self {
        self.reject_policy = Some(Arc::new(policy));
        self
    }

    /// NIP-11 relay information document, served on an HTTP GET with
    /// `Accept: application/nostr+json`.
    fn info_document(&self) -> serde_json::Value {
        serde_json::json!({
            "name": "test-relay",
            "description": "in-process relay used for sync engine tests",
            "supported_nips": [1, 42, 65],
        })
    }

    /// Bind and start serving. Returns the bound address (useful when
    /// `config.port == 0`) and a handle to the server task.
    pub async fn run(self: Arc<Self>) -> Result<(SocketAddr, JoinHandle<()>)> {
        let host: std::net::IpAddr = self.config.host.parse().unwrap_or(std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST));
        let addr = SocketAddr::new(host, self.config.port);

        let this = Arc::clone(&self);
        let info_route = warp::path::end()
            .and(warp::get())
            .and(warp::header::optional::<String>("accept"))
            .map({
                let this = Arc::clone(&this);
                move |accept: Option<String>| {
                    if accept.as_deref() == Some("application/nostr+json") {
                        warp::reply::json(&this.info_document())
                    } else {
                        warp::reply::json(&serde_json::json!({"status": "ok"}))
                    }
                }
            });

        let ws_route = warp::path::end().and(warp::ws()).map({
            let this = Arc::clone(&this);
            move |ws: warp::ws::Ws| {
                let this = Arc::clone(&this);
                ws.on_upgrade(move |socket| async move { this.handle_connection(socket).await })
            }
        });

        let routes = ws_route.or(info_route);
        let (bound_addr, server) = warp::serve(routes)
            .try_bind_ephemeral(addr)
            .map_err(|error| crate::error::RelayError::Io(std::io::Error::other(error.to_string())))?;

        let handle = tokio::spawn(server);
        Ok((bound_addr, handle))
    }

    async fn handle_connection(&self, socket: WebSocket) {
        let (mut tx, mut rx) = socket.split();
        let subscriptions: Mutex<HashMap<String, nostr::Filter>> = Mutex::new(HashMap::new());
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<RelayMessage>();

        let forward_task = tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                let text = message.to_json().to_string();
                if tx.send(WsMessage::text(text)).await.is_err() {
                    break;
                }
            }
        });

        while let Some(frame) = rx.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(error) => {
                    debug!("websocket read error: {}", error);
                    break;
                }
            };
            if !frame.is_text() {
                continue;
            }
            let text = match frame.to_str() {
                Ok(text) => text,
                Err(_) => continue,
            };

            if self.limiter.check().is_err() {
                let _ = out_tx.send(RelayMessage::Notice("rate-limited".to_string()));
                continue;
            }

            match parse_client_message(text) {
                Ok(Some(ClientMessage::Event(event))) => {
                    self.handle_event(&event, &out_tx).await;
                }
                Ok(Some(ClientMessage::Req(sub_id, filters))) => {
                    self.handle_req(sub_id, filters, &subscriptions, &out_tx).await;
                }
                Ok(Some(ClientMessage::Close(sub_id))) => {
                    subscriptions.lock().await.remove(&sub_id);
                }
                Ok(Some(ClientMessage::Auth(_))) => {
                    // Accepted but not required; this test relay never
                    // gates reads or writes on authentication.
                }
                Ok(None) => {}
                Err(error) => {
                    warn!("malformed client message: {}", error);
                }
            }
        }

        forward_task.abort();
    }

    async fn handle_event(&self, event: &Event, out_tx: &mpsc::UnboundedSender<RelayMessage>) {
        if let Some(policy) = &self.reject_policy
            && let Some(reason) = policy(event)
        {
            let _ = out_tx.send(RelayMessage::Ok(event.id.clone(), false, reason));
            return;
        }

        if serde_json::to_vec(event).map(|bytes| bytes.len()).unwrap_or(0) > self.config.max_event_bytes {
            let _ = out_tx.send(RelayMessage::Ok(event.id.clone(), false, "invalid: event too large".to_string()));
            return;
        }

        match self.db.insert_event(event) {
            Ok(_) => {
                let _ = out_tx.send(RelayMessage::Ok(event.id.clone(), true, String::new()));
            }
            Err(error) => {
                let _ = out_tx.send(RelayMessage::Ok(event.id.clone(), false, format!("error: {error}")));
            }
        }
    }

    async fn handle_req(
        &self,
        sub_id: String,
        filters: Vec<serde_json::Value>,
        subscriptions: &Mutex<HashMap<String, nostr::Filter>>,
        out_tx: &mpsc::UnboundedSender<RelayMessage>,
    ) {
        let filter: nostr::Filter = match filters.first() {
            Some(value) => match serde_json::from_value(value.clone()) {
                Ok(filter) => filter,
                Err(error) => {
                    let _ = out_tx.send(RelayMessage::Closed(sub_id, format!("error: invalid filter: {error}")));
                    return;
                }
            },
            None => nostr::Filter::default(),
        };

        match self.db.query_events(&filter) {
            Ok(events) => {
                for event in events {
                    let _ = out_tx.send(RelayMessage::Event(sub_id.clone(), event));
                }
                let _ = out_tx.send(RelayMessage::Eose(sub_id.clone()));
                subscriptions.lock().await.insert(sub_id, filter);
            }
            Err(error) => {
                let _ = out_tx.send(RelayMessage::Closed(sub_id, format!("error: {error}")));
            }
        }
    }
}
