//! Integration tests for the outbox sync engine against real in-process
//! relays, exercising [`nostr_sync::SyncEngine`] end to end (spec.md §8's
//! scenario table and boundary behaviors).

pub mod boundary_behaviors;
pub mod outbox_scenarios;

use std::net::SocketAddr;
use std::sync::Once;

use nostr::{Event, EventTemplate, SecretKey, finalize_event, generate_secret_key};
use nostr_client::{PoolConfig, RelayPool};
use nostr_relay::{Database, DatabaseConfig, RelayConfig, RelayServer};
use std::sync::Arc;
use tokio::task::JoinHandle;

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    });
}

/// A running in-process relay. Holds the task handle so the relay stays
/// up for the lifetime of the test; dropping it aborts the server. `db`
/// lets a test seed events directly, simulating "this relay already has
/// these events" without routing them through the engine under test.
pub struct TestRelay {
    pub url: String,
    pub db: Arc<Database>,
    handle: JoinHandle<()>,
}

impl Drop for TestRelay {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Start a fresh in-memory relay on an ephemeral port and return its
/// `ws://` URL.
pub async fn start_test_relay() -> TestRelay {
    start_test_relay_with(RelayServer::new).await
}

/// Start a fresh in-memory relay, letting the caller customize the
/// [`RelayServer`] (e.g. attach a reject policy) before it binds.
pub async fn start_test_relay_with(build: impl FnOnce(RelayConfig, Arc<Database>) -> RelayServer) -> TestRelay {
    init_tracing();
    let db = Arc::new(Database::new(DatabaseConfig::in_memory()).expect("in-memory database"));
    let server = Arc::new(build(RelayConfig::default(), Arc::clone(&db)));
    let (addr, handle): (SocketAddr, JoinHandle<()>) = server.run().await.expect("relay binds");
    TestRelay {
        url: format!("ws://{addr}"),
        db,
        handle,
    }
}

/// A connected pool with one relay registered, ready to publish/subscribe.
pub async fn connected_pool(urls: &[&str]) -> RelayPool {
    let pool = RelayPool::new(PoolConfig::default());
    for url in urls {
        pool.add_relay(url).await.expect("valid relay url");
    }
    pool.connect_all().await.expect("at least one relay");
    // Connection is async (spawned on `connect`); give the read loop a
    // moment to flip state to Connected before the caller proceeds.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    pool
}

/// Mint a signed kind-1 note with an explicit `created_at`, so tests can
/// control ordering precisely.
pub fn note_at(secret_key: &SecretKey, created_at: u64, content: &str) -> Event {
    let template = EventTemplate {
        created_at,
        kind: 1,
        tags: vec![],
        content: content.to_string(),
    };
    finalize_event(&template, secret_key).expect("signing succeeds")
}

pub fn fresh_key() -> SecretKey {
    generate_secret_key()
}
