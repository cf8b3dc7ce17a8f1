//! The Progress Reporter: a one-way channel external observers subscribe
//! to without influencing the run (spec.md §2, §6).

/// Where a run currently is. Matches spec.md §6's phase enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    FetchingRelays,
    FetchingBatch,
    SyncingEvent,
    BatchComplete,
    Error,
    Complete,
}

/// A single progress record (spec.md §3's "Progress record").
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub message: String,
    pub cursor_until: u64,
    pub floor_until: Option<u64>,
    pub current_event_id: Option<String>,
    pub error_details: Option<String>,
}

impl ProgressEvent {
    pub fn new(phase: Phase, message: impl Into<String>, cursor_until: u64, floor_until: Option<u64>) -> Self {
        Self {
            phase,
            message: message.into(),
            cursor_until,
            floor_until,
            current_event_id: None,
            error_details: None,
        }
    }

    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.current_event_id = Some(event_id.into());
        self
    }

    pub fn with_error_details(mut self, details: impl Into<String>) -> Self {
        self.error_details = Some(details.into());
        self
    }
}

/// Emit a progress record, tolerating a disconnected or absent receiver —
/// the engine never blocks on, or fails because of, an uninterested
/// observer.
pub(crate) fn emit(sink: &Option<tokio::sync::mpsc::UnboundedSender<ProgressEvent>>, event: ProgressEvent) {
    if let Some(sink) = sink {
        let _ = sink.send(event);
    }
}
