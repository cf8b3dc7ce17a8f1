use std::sync::Arc;

use nostr_relay::{Database, DatabaseConfig, RelayConfig, RelayServer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut config = RelayConfig::default();
    config.port = std::env::var("NOSTR_RELAY_PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(7777);

    let db_path = std::env::var("NOSTR_RELAY_DB").ok();
    let db_config = match db_path {
        Some(path) => DatabaseConfig::file(path),
        None => DatabaseConfig::in_memory(),
    };

    let db = Arc::new(Database::new(db_config)?);
    let server = Arc::new(RelayServer::new(config, db));
    let (addr, handle) = server.run().await?;
    tracing::info!("nostr-relay listening on {}", addr);
    handle.await?;
    Ok(())
}
