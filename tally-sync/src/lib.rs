//! # tally-sync
//!
//! Reconciliation between the local ledger and the external sheet.
//!
//! [`SyncEngine::run_cycle`] drives one full cycle: fetch the sheet, plan
//! the minimal writes, resolve external edits against pending ledger
//! changes, apply the writes in order, then commit a new checkpoint. The
//! checkpoint only moves after every write succeeded, so any failed cycle
//! is safe to retry.

pub mod checkpoint;
pub mod diff;
pub mod engine;
pub mod error;
pub mod events;
pub mod planner;
pub mod report;
pub mod resolver;

pub use checkpoint::{Checkpoint, SnapshotRow};
pub use diff::{diff_sheet, SheetDiff};
pub use engine::{CycleOutcome, CyclePhase, SyncEngine};
pub use error::SyncError;
pub use events::{EventSink, LogSink, MemorySink, SyncEvent};
pub use planner::{Plan, PlannedWrite, WriteTarget};
pub use report::{check, format_datetime_age, SheetState, StatusReport};
pub use resolver::{ConflictOutcome, ConflictPolicy, ConflictReport, Resolution};
