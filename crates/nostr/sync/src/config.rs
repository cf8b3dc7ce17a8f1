//! Policy knobs driving the sync engine (spec.md §6).

use std::time::Duration;

pub const BATCH_SIZE: u32 = 20;
pub const BATCH_TIMEOUT_MS: u64 = 15_000;
pub const PUBLISH_TIMEOUT_MS: u64 = 5_000;
pub const INTER_EVENT_DELAY_MS: u64 = 10_000;
pub const INTER_BATCH_DELAY_MS: u64 = 10_000;
pub const MAX_WRITE_RELAYS: usize = 5;
pub const MAX_READ_RELAYS: usize = 5;

/// How far ahead of `batch_timeout` a batch fetcher closes its own
/// subscription, leaving slack for a cooperative `CLOSE` round-trip before
/// the wall-clock deadline would otherwise fire (spec.md §4.3).
const CLOSE_SLACK: Duration = Duration::from_secs(3);

/// Runtime configuration for [`crate::SyncEngine`]. `Default` gives
/// spec.md's literal constants.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub batch_size: u32,
    pub batch_timeout: Duration,
    pub publish_timeout: Duration,
    pub inter_event_delay: Duration,
    pub inter_batch_delay: Duration,
    /// Advisory; enforced at the orchestration layer, not inside
    /// [`crate::SyncEngine`] (spec.md §6).
    pub max_write_relays: usize,
    pub max_read_relays: usize,
}

impl SyncConfig {
    /// The batch fetcher's internal subscription deadline: `batch_timeout`
    /// minus [`CLOSE_SLACK`], per spec.md §4.3.
    pub fn fetch_deadline(&self) -> Duration {
        self.batch_timeout.saturating_sub(CLOSE_SLACK)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: BATCH_SIZE,
            batch_timeout: Duration::from_millis(BATCH_TIMEOUT_MS),
            publish_timeout: Duration::from_millis(PUBLISH_TIMEOUT_MS),
            inter_event_delay: Duration::from_millis(INTER_EVENT_DELAY_MS),
            inter_batch_delay: Duration::from_millis(INTER_BATCH_DELAY_MS),
            max_write_relays: MAX_WRITE_RELAYS,
            max_read_relays: MAX_READ_RELAYS,
        }
    }
}
