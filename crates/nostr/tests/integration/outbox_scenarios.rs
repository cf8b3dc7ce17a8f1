//! spec.md §8's end-to-end scenario table, run against real in-process
//! relays.

use std::time::Duration;

use nostr::Filter;
use nostr_relay::RelayServer;
use nostr_sync::{SyncConfig, SyncEngine};

use super::{connected_pool, fresh_key, note_at, start_test_relay, start_test_relay_with};

/// Real defaults sleep ten seconds between events and batches; these tests
/// only care about ordering and outcome, so they use a config that keeps
/// the same shape with millisecond pacing.
fn fast_config() -> SyncConfig {
    SyncConfig {
        inter_event_delay: Duration::from_millis(10),
        inter_batch_delay: Duration::from_millis(10),
        publish_timeout: Duration::from_secs(2),
        ..SyncConfig::default()
    }
}

/// Scenario 1: A has E1(100), E2(90); B has nothing. Both publishes land
/// on B; the counter reaches 2 and the run completes.
#[tokio::test]
async fn publishes_missing_events_to_the_relay_that_lacks_them() {
    let relay_a = start_test_relay().await;
    let relay_b = start_test_relay().await;
    let key = fresh_key();

    let e1 = note_at(&key, 100, "first");
    let e2 = note_at(&key, 90, "second");
    relay_a.db.insert_event(&e1).unwrap();
    relay_a.db.insert_event(&e2).unwrap();

    let pool = connected_pool(&[&relay_a.url, &relay_b.url]).await;
    let engine = SyncEngine::new(&pool, fast_config());
    let filter = Filter::write_filter(&key.public_key_hex());

    let outcome = engine
        .sync(&[relay_a.url.clone(), relay_b.url.clone()], filter, 200, None, None, None)
        .await
        .expect("sync completes");

    assert_eq!(outcome.total_synced_count, 2);

    let on_b = relay_b.db.query_events(&Filter::new()).unwrap();
    assert_eq!(on_b.len(), 2);
}

/// Scenario 2: publishing E1 to C is rejected with a non-deletion reason.
/// The run fails immediately, preserving the cursor and surfacing the
/// per-relay reason.
#[tokio::test]
async fn non_deletion_rejection_halts_the_run() {
    let relay_a = start_test_relay().await;
    let relay_b = start_test_relay().await;
    let relay_c = start_test_relay_with(|config, db| RelayServer::new(config, db).with_reject_policy(|_event| Some("rate-limited".to_string()))).await;
    let key = fresh_key();

    let e1 = note_at(&key, 100, "only event");
    relay_a.db.insert_event(&e1).unwrap();
    relay_b.db.insert_event(&e1).unwrap();

    let pool = connected_pool(&[&relay_a.url, &relay_b.url, &relay_c.url]).await;
    let engine = SyncEngine::new(&pool, fast_config());
    let filter = Filter::write_filter(&key.public_key_hex());

    let error = engine
        .sync(&[relay_a.url.clone(), relay_b.url.clone(), relay_c.url.clone()], filter, 200, None, None, None)
        .await
        .expect_err("publish rejection halts the run");

    // Failure happens mid-batch (step 6g), before the cursor advances in
    // step 7 — `resume_from` is this batch's fetch cursor, not E1's
    // `created_at`.
    assert_eq!(error.resume_from, 200);
    assert_eq!(error.total_synced_count, 0);
    assert!(matches!(error.source, nostr_sync::SyncError::PublishRejected { .. }));
    assert!(error.to_string().contains("rate-limited"));
}

/// Scenario 3: the only target relay reports EOSE with nothing behind it.
/// The run completes immediately with nothing synced.
#[tokio::test]
async fn empty_batch_completes_immediately() {
    let relay_a = start_test_relay().await;
    let key = fresh_key();

    let pool = connected_pool(&[&relay_a.url]).await;
    let engine = SyncEngine::new(&pool, fast_config());
    let filter = Filter::write_filter(&key.public_key_hex());

    let outcome = engine
        .sync(&[relay_a.url.clone()], filter, now_ish(), None, None, None)
        .await
        .expect("empty history completes");

    assert_eq!(outcome.total_synced_count, 0);
}

/// Scenario 4: `stop_at` skips events older than the cutoff within the
/// same batch.
#[tokio::test]
async fn stop_at_skips_older_events_in_the_same_batch() {
    let relay_a = start_test_relay().await;
    let key = fresh_key();

    let e1 = note_at(&key, 50, "kept");
    let e2 = note_at(&key, 40, "skipped");
    relay_a.db.insert_event(&e1).unwrap();
    relay_a.db.insert_event(&e2).unwrap();

    let pool = connected_pool(&[&relay_a.url]).await;
    let engine = SyncEngine::new(&pool, fast_config());
    let filter = Filter::write_filter(&key.public_key_hex());

    let outcome = engine
        .sync(&[relay_a.url.clone()], filter, 100, Some(45), None, None)
        .await
        .expect("sync completes");

    // Both events already live on the only target relay (they were seeded
    // there directly), so the sighting index reports neither as missing;
    // only E1 is even considered, and the run completes with no publishes.
    assert_eq!(outcome.total_synced_count, 1);
}

/// Scenario 5: A has E1; B has E1 and E2. Sighting for E1 covers both
/// relays already (no publish); E2 is missing from A and gets published
/// there. Counter reaches 2, exactly one publish call is made.
#[tokio::test]
async fn only_publishes_what_the_sighting_index_says_is_missing() {
    let relay_a = start_test_relay().await;
    let relay_b = start_test_relay().await;
    let key = fresh_key();

    let e1 = note_at(&key, 100, "on both");
    let e2 = note_at(&key, 99, "only on b");
    relay_a.db.insert_event(&e1).unwrap();
    relay_b.db.insert_event(&e1).unwrap();
    relay_b.db.insert_event(&e2).unwrap();

    let pool = connected_pool(&[&relay_a.url, &relay_b.url]).await;
    let engine = SyncEngine::new(&pool, fast_config());
    let filter = Filter::write_filter(&key.public_key_hex());

    let outcome = engine
        .sync(&[relay_a.url.clone(), relay_b.url.clone()], filter, 200, None, None, None)
        .await
        .expect("sync completes");

    assert_eq!(outcome.total_synced_count, 2);
    let on_a = relay_a.db.query_events(&Filter::new()).unwrap();
    assert_eq!(on_a.len(), 2);
}

/// Scenario 6: a deletion-reason rejection is tolerated; the run
/// continues without failing, though the event doesn't count toward the
/// synced total.
#[tokio::test]
async fn deletion_reason_rejection_is_tolerated() {
    let relay_a =
        start_test_relay_with(|config, db| RelayServer::new(config, db).with_reject_policy(|_event| Some("deletion: event has been deleted".to_string()))).await;
    let relay_b = start_test_relay().await;
    let key = fresh_key();

    let e1 = note_at(&key, 100, "deleted upstream");
    relay_b.db.insert_event(&e1).unwrap();

    let pool = connected_pool(&[&relay_a.url, &relay_b.url]).await;
    let engine = SyncEngine::new(&pool, fast_config());
    let filter = Filter::write_filter(&key.public_key_hex());

    let outcome = engine
        .sync(&[relay_a.url.clone(), relay_b.url.clone()], filter, 200, None, None, None)
        .await
        .expect("deletion rejection does not fail the run");

    assert_eq!(outcome.total_synced_count, 0);
}

fn now_ish() -> u64 {
    4_000_000_000
}
