//! Test relay configuration.

use std::num::NonZeroU32;

/// Storage configuration. `path: None` opens an in-memory database, useful
/// for one-shot test fixtures that don't need to survive the process.
#[derive(Debug, Clone, Default)]
pub struct DatabaseConfig {
    pub path: Option<std::path::PathBuf>,
}

impl DatabaseConfig {
    pub fn in_memory() -> Self {
        Self { path: None }
    }

    pub fn file(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: Some(path.into()) }
    }
}

/// Server-side listener configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub host: String,
    /// `0` asks the OS for an ephemeral port; the bound port is returned
    /// by [`crate::server::RelayServer::run`].
    pub port: u16,
    pub max_event_bytes: usize,
    pub rate_limit_per_sec: NonZeroU32,
}

const DEFAULT_RATE_LIMIT_PER_SEC: NonZeroU32 = match NonZeroU32::new(50) {
    Some(value) => value,
    None => unreachable!(),
};

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            max_event_bytes: 64 * 1024,
            rate_limit_per_sec: DEFAULT_RATE_LIMIT_PER_SEC,
        }
    }
}
