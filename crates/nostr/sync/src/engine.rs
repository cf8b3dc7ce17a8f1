//! The backward-paginating state machine (spec.md §4.4).

use std::collections::BTreeMap;

use nostr::{Event, Filter};
use nostr_client::RelayPool;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::info;

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::fetch::fetch_batch;
use crate::progress::{self, Phase, ProgressEvent};

/// What a completed or failed run accumulated. `resume_from` is populated
/// identically whether the run completed or failed: on completion it is
/// simply the last cursor value reached, with no further meaning; on
/// failure it is exactly the cursor a subsequent run should resume from
/// (spec.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    pub total_synced_count: u64,
    pub resume_from: u64,
}

/// A run that did not reach `Complete`. Carries the same bookkeeping a
/// successful [`SyncOutcome`] would, plus the error that halted the run.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct SyncRunError {
    #[source]
    pub source: SyncError,
    pub total_synced_count: u64,
    pub resume_from: u64,
}

/// The strict-halt, backward-paginating sync engine.
pub struct SyncEngine<'a> {
    pool: &'a RelayPool,
    config: SyncConfig,
}

impl<'a> SyncEngine<'a> {
    pub fn new(pool: &'a RelayPool, config: SyncConfig) -> Self {
        Self { pool, config }
    }

    /// Run one sync to completion or failure (spec.md §4.4's state
    /// machine). `stop_at` of `None` behaves as spec.md's
    /// "-∞-equivalent": the run only ends on an empty batch.
    pub async fn sync(
        &self,
        target_urls: &[String],
        mut filter: Filter,
        initial_until: u64,
        stop_at: Option<u64>,
        mut cancel: Option<watch::Receiver<bool>>,
        progress_tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
    ) -> Result<SyncOutcome, SyncRunError> {
        if target_urls.is_empty() {
            return Err(self.fail(SyncError::NoRelays, initial_until, 0, &progress_tx, "no relays in target set", stop_at, None));
        }

        if let Some(stop) = stop_at
            && stop > initial_until
        {
            progress::emit(
                &progress_tx,
                ProgressEvent::new(Phase::Complete, "stop-at is newer than initial-until; nothing to do", initial_until, stop_at),
            );
            return Ok(SyncOutcome {
                total_synced_count: 0,
                resume_from: initial_until,
            });
        }

        let mut cursor_until = initial_until;
        let mut total_synced_count: u64 = 0;

        progress::emit(
            &progress_tx,
            ProgressEvent::new(Phase::FetchingRelays, "checking target relay connectivity", cursor_until, stop_at),
        );

        loop {
            if is_cancelled(&mut cancel) {
                return Err(self.fail(SyncError::Cancelled, cursor_until, total_synced_count, &progress_tx, "cancelled", stop_at, None));
            }

            filter.until = Some(cursor_until);
            filter.limit = Some(self.config.batch_size);

            progress::emit(
                &progress_tx,
                ProgressEvent::new(Phase::FetchingBatch, "fetching next batch", cursor_until, stop_at),
            );

            let events = match fetch_batch(self.pool, target_urls, &filter, &self.config).await {
                Ok(events) => events,
                Err(error) => {
                    let message = error.to_string();
                    return Err(self.fail(error, cursor_until, total_synced_count, &progress_tx, message, stop_at, None));
                }
            };

            if let Err(disconnected) = self.check_connectivity(target_urls).await {
                let message = format!("Unable to connect {disconnected}");
                return Err(self.fail(
                    SyncError::Disconnected { url: disconnected },
                    cursor_until,
                    total_synced_count,
                    &progress_tx,
                    message,
                    stop_at,
                    None,
                ));
            }

            if events.is_empty() {
                let message = if stop_at.is_some() {
                    "reached end of range".to_string()
                } else {
                    "reached end of history".to_string()
                };
                progress::emit(&progress_tx, ProgressEvent::new(Phase::Complete, message, cursor_until, stop_at));
                return Ok(SyncOutcome {
                    total_synced_count,
                    resume_from: cursor_until,
                });
            }

            let slice = sorted_slice(events, self.config.batch_size);

            for event in &slice {
                if let Some(stop) = stop_at
                    && event.created_at < stop
                {
                    break;
                }

                if is_cancelled(&mut cancel) {
                    return Err(self.fail(SyncError::Cancelled, cursor_until, total_synced_count, &progress_tx, "cancelled", stop_at, None));
                }

                progress::emit(
                    &progress_tx,
                    ProgressEvent::new(Phase::SyncingEvent, "syncing event", cursor_until, stop_at).with_event_id(event.id.clone()),
                );

                let sighted_on = self.pool.sighted_on(&event.id).await;
                let missing: Vec<String> = target_urls
                    .iter()
                    .filter(|url| !sighted_on.contains(url))
                    .cloned()
                    .collect();

                if missing.is_empty() {
                    total_synced_count += 1;
                    continue;
                }

                match self.publish_to(event, &missing).await {
                    Ok(()) => {
                        total_synced_count += 1;
                    }
                    Err(PublishOutcome::Deletion) => {
                        info!(event_id = %event.id, "publish rejected as a deletion, continuing");
                    }
                    Err(PublishOutcome::Rejected(reasons)) => {
                        let message = format!("publish of {} rejected", event.id);
                        return Err(self.fail(
                            SyncError::PublishRejected {
                                event_id: event.id.clone(),
                                reasons: reasons.clone(),
                            },
                            cursor_until,
                            total_synced_count,
                            &progress_tx,
                            message,
                            stop_at,
                            Some(format_reasons(&reasons)),
                        ));
                    }
                }

                sleep(self.config.inter_event_delay).await;
            }

            let oldest = slice.last().map(|event| event.created_at).unwrap_or(cursor_until);
            cursor_until = oldest.saturating_sub(1);

            if let Some(stop) = stop_at
                && oldest <= stop
            {
                progress::emit(
                    &progress_tx,
                    ProgressEvent::new(Phase::Complete, "reached stop-at", cursor_until, stop_at),
                );
                return Ok(SyncOutcome {
                    total_synced_count,
                    resume_from: cursor_until,
                });
            }

            progress::emit(&progress_tx, ProgressEvent::new(Phase::BatchComplete, "batch complete", cursor_until, stop_at));
            sleep(self.config.inter_batch_delay).await;
        }
    }

    async fn check_connectivity(&self, target_urls: &[String]) -> Result<(), String> {
        let connected = self.pool.connected_relays().await;
        for url in target_urls {
            if !connected.contains(url) {
                return Err(url.clone());
            }
        }
        Ok(())
    }

    async fn publish_to(&self, event: &Event, missing: &[String]) -> Result<(), PublishOutcome> {
        match self.pool.publish_to(event, missing, self.config.publish_timeout).await {
            Ok(confirmations) => {
                let by_relay: BTreeMap<&str, &nostr_client::PublishConfirmation> =
                    confirmations.iter().map(|confirmation| (confirmation.relay_url.as_str(), confirmation)).collect();

                let confirmed_missing = missing.iter().filter(|url| by_relay.get(url.as_str()).is_some_and(|c| c.accepted)).count();
                if confirmed_missing >= missing.len() {
                    return Ok(());
                }

                let reasons: BTreeMap<String, String> = missing
                    .iter()
                    .filter_map(|url| match by_relay.get(url.as_str()) {
                        Some(confirmation) if confirmation.accepted => None,
                        Some(confirmation) => Some((url.clone(), confirmation.message.clone())),
                        None => Some((url.clone(), "timed out waiting for acknowledgment".to_string())),
                    })
                    .collect();

                classify_publish_failure(reasons)
            }
            Err(error) => classify_publish_failure(missing.iter().map(|url| (url.clone(), error.to_string())).collect()),
        }
    }

    fn fail(
        &self,
        source: SyncError,
        cursor_until: u64,
        total_synced_count: u64,
        progress_tx: &Option<mpsc::UnboundedSender<ProgressEvent>>,
        message: impl Into<String>,
        floor_until: Option<u64>,
        details: Option<String>,
    ) -> SyncRunError {
        let mut event = ProgressEvent::new(Phase::Error, message, cursor_until, floor_until);
        if let Some(details) = details {
            event = event.with_error_details(details);
        }
        progress::emit(progress_tx, event);
        SyncRunError {
            source,
            total_synced_count,
            resume_from: cursor_until,
        }
    }
}

enum PublishOutcome {
    Deletion,
    Rejected(BTreeMap<String, String>),
}

fn classify_publish_failure(reasons: BTreeMap<String, String>) -> Result<(), PublishOutcome> {
    if reasons.is_empty() {
        return Err(PublishOutcome::Rejected(reasons));
    }
    let all_deletions = reasons.values().all(|reason| reason.to_lowercase().contains("deletion"));
    if all_deletions {
        Err(PublishOutcome::Deletion)
    } else {
        Err(PublishOutcome::Rejected(reasons))
    }
}

fn format_reasons(reasons: &BTreeMap<String, String>) -> String {
    reasons
        .iter()
        .map(|(url, reason)| format!("{url}: {reason}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Sort newest-first and keep the first `limit` (spec.md §4.5).
fn sorted_slice(mut events: Vec<Event>, limit: u32) -> Vec<Event> {
    events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    events.truncate(limit as usize);
    events
}

fn is_cancelled(cancel: &mut Option<watch::Receiver<bool>>) -> bool {
    cancel.as_ref().map(|receiver| *receiver.borrow()).unwrap_or(false)
}
