//! Transport and pool configuration knobs.

use std::time::Duration;

/// Per-relay transport configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub connect_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Pool-wide configuration (spec.md §4.2).
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Minimum number of relays that must acknowledge a publish for
    /// [`crate::RelayPool::publish`] to resolve successfully.
    pub min_write_confirmations: usize,
    /// Hard deadline for a pool-wide subscription to reach aggregate EOSE.
    pub max_wait: Duration,
    /// Small delay coalescing near-simultaneous subscribe calls. Unused
    /// by the sync engine but kept for parity with spec.md §4.2.
    pub group_delay: Duration,
    /// Per-relay deadline for the correlated `OK` in [`crate::RelayPool::publish`].
    /// Callers that need spec.md §6's `PUBLISH_TIMEOUT_MS` override this.
    pub publish_timeout: Duration,
    pub relay_config: RelayConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_write_confirmations: 1,
            max_wait: Duration::from_secs(15),
            group_delay: Duration::from_millis(0),
            publish_timeout: Duration::from_secs(10),
            relay_config: RelayConfig::default(),
        }
    }
}
