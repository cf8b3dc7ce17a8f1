//! spec.md §8's boundary behaviors not already covered by
//! [`nostr_sync::engine`]'s unit tests (empty target set and
//! `stop_at > initial_until` are exercised there, against a mock-free
//! pool — no relay needed for those). These two need a real relay
//! round trip.

use std::time::Duration;

use nostr::Filter;
use nostr_relay::RelayServer;
use nostr_sync::{SyncConfig, SyncEngine};

use super::{connected_pool, fresh_key, note_at, start_test_relay, start_test_relay_with};

fn fast_config() -> SyncConfig {
    SyncConfig {
        inter_event_delay: Duration::from_millis(10),
        inter_batch_delay: Duration::from_millis(10),
        publish_timeout: Duration::from_secs(2),
        ..SyncConfig::default()
    }
}

/// When every target relay already has every event, the counter still
/// increments but no publish is ever attempted. Proven indirectly: both
/// relays are configured to reject anything published to them, yet the
/// run still completes — if the engine had (incorrectly) tried to publish
/// the already-sighted event, the run would fail instead.
#[tokio::test]
async fn fully_sighted_events_increment_the_counter_without_publishing() {
    let reject_everything = |_event: &nostr::Event| Some("should never be called".to_string());

    let relay_a = start_test_relay_with(move |config, db| RelayServer::new(config, db).with_reject_policy(reject_everything)).await;
    let relay_b = start_test_relay_with(move |config, db| RelayServer::new(config, db).with_reject_policy(reject_everything)).await;
    let key = fresh_key();

    let e1 = note_at(&key, 100, "already everywhere");
    relay_a.db.insert_event(&e1).unwrap();
    relay_b.db.insert_event(&e1).unwrap();

    let pool = connected_pool(&[&relay_a.url, &relay_b.url]).await;
    let engine = SyncEngine::new(&pool, fast_config());
    let filter = Filter::write_filter(&key.public_key_hex());

    let outcome = engine
        .sync(&[relay_a.url.clone(), relay_b.url.clone()], filter, 200, None, None, None)
        .await
        .expect("no publish is ever attempted, so no rejection can fire");

    assert_eq!(outcome.total_synced_count, 1);
}

/// A disconnected target relay fails the run at the pre-batch health
/// check, before any fetch is attempted.
#[tokio::test]
async fn disconnected_target_relay_fails_health_check() {
    let relay_a = start_test_relay().await;
    let key = fresh_key();

    let pool = connected_pool(&[&relay_a.url]).await;
    let engine = SyncEngine::new(&pool, fast_config());
    let filter = Filter::write_filter(&key.public_key_hex());

    // "wss://unreachable.invalid" is never added to the pool, so it is
    // never connected: this exercises the same codepath a relay that
    // dropped mid-run would hit.
    let error = engine
        .sync(&[relay_a.url.clone(), "wss://unreachable.invalid".to_string()], filter, 200, None, None, None)
        .await
        .expect_err("missing relay fails the health check");

    assert!(matches!(error.source, nostr_sync::SyncError::Disconnected { .. }));
    assert_eq!(error.resume_from, 200);
}
