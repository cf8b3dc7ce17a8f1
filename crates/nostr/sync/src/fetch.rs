//! The Batch Fetcher: one bounded fetch per call, no state across calls
//! (spec.md §4.3).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use nostr::{Event, Filter};
use nostr_client::{RelayCompletion, RelayPool};

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};

static NEXT_SUB_ID: AtomicU64 = AtomicU64::new(0);

fn next_sub_id() -> String {
    format!("sync-fetch-{}", NEXT_SUB_ID.fetch_add(1, Ordering::Relaxed))
}

/// Run one bounded fetch against `target_urls`, accumulating every event
/// every relay delivers — duplicates across relays included, since every
/// sighting matters to the caller (spec.md §4.3: "MUST NOT deduplicate
/// against the sighting index").
///
/// `filter.until` must already be set by the caller (the engine owns the
/// cursor; the fetcher is stateless).
pub async fn fetch_batch(pool: &RelayPool, target_urls: &[String], filter: &Filter, config: &SyncConfig) -> Result<Vec<Event>> {
    let sub_id = next_sub_id();
    let batch = pool
        .subscribe_batch(&sub_id, &[filter.to_json()], target_urls)
        .await
        .map_err(|error| match error {
            nostr_client::ClientError::NoRelays => SyncError::NoRelays,
            other => SyncError::Client(other),
        })?;

    let result = batch.drain(config.fetch_deadline()).await;
    let _ = pool.unsubscribe(&sub_id).await;

    if result.timed_out {
        return Err(SyncError::FetchTimeout);
    }

    let unexpected_closures: BTreeMap<String, String> = result
        .completions
        .iter()
        .filter_map(|(url, completion)| match completion {
            RelayCompletion::Closed(reason) => Some((url.clone(), reason.clone())),
            RelayCompletion::Eose => None,
        })
        .collect();

    if !unexpected_closures.is_empty() {
        return Err(SyncError::FetchClosedUnexpectedly {
            reasons: unexpected_closures,
        });
    }

    Ok(result.events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr_client::PoolConfig;

    #[tokio::test]
    async fn empty_target_set_is_no_relays() {
        let pool = RelayPool::new(PoolConfig::default());
        let filter = Filter::write_filter("alice").with_until(100);
        let config = SyncConfig::default();
        let result = fetch_batch(&pool, &[], &filter, &config).await;
        assert!(matches!(result, Err(SyncError::NoRelays)));
    }

    #[tokio::test]
    async fn unreachable_relay_is_no_relays() {
        let pool = RelayPool::new(PoolConfig::default());
        pool.add_relay("wss://relay.example").await.unwrap();
        let filter = Filter::write_filter("alice").with_until(100);
        let config = SyncConfig::default();
        let result = fetch_batch(&pool, &["wss://relay.example".to_string()], &filter, &config).await;
        assert!(matches!(result, Err(SyncError::NoRelays)));
    }
}
