//! Observable events emitted by the sync engine.
//!
//! Consumers (logging, alerting, the daemon status payload) implement
//! [`EventSink`]; the engine itself stays agnostic of where events go.

use std::sync::Mutex;

use tally_core::ItemId;

use crate::resolver::ConflictOutcome;

/// Everything the engine reports about a reconciliation cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    CycleStarted,
    CycleSucceeded { applied: usize },
    CycleFailed { reason: String },
    ConflictDetected { item: ItemId, outcome: ConflictOutcome },
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: SyncEvent);
}

/// Default sink: events go to the log.
#[derive(Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: SyncEvent) {
        match &event {
            SyncEvent::CycleStarted => tracing::debug!("reconciliation cycle started"),
            SyncEvent::CycleSucceeded { applied } => {
                tracing::info!("reconciliation cycle succeeded, {applied} op(s) applied")
            }
            SyncEvent::CycleFailed { reason } => {
                tracing::error!("reconciliation cycle failed: {reason}")
            }
            SyncEvent::ConflictDetected { item, outcome } => {
                tracing::warn!("conflict on '{item}' resolved as {outcome}")
            }
        }
    }
}

/// Captures events in memory; used by tests and the daemon status payload.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<SyncEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<SyncEvent> {
        std::mem::take(&mut *self.lock())
    }

    pub fn events(&self) -> Vec<SyncEvent> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<SyncEvent>> {
        self.events.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: SyncEvent) {
        self.lock().push(event);
    }
}

impl<S: EventSink + ?Sized> EventSink for std::sync::Arc<S> {
    fn emit(&self, event: SyncEvent) {
        (**self).emit(event);
    }
}
