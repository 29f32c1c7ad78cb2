//! Sync engine — drives one reconciliation cycle at a time.
//!
//! Cycle phases: `Idle → Fetching → Planning → Resolving → Applying →
//! Committing → Idle`, with `Failed` reachable from any non-idle phase.
//! The checkpoint is committed only after every operation in the plan
//! succeeded; a failed or cancelled cycle leaves it untouched, so the next
//! cycle recomputes an equivalent plan from the last known-good state.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;

use tally_core::{Config, Ledger, TxDraft, TxKind};
use tally_gateway::{
    GatewayConfig, HttpTransport, MemoryTransport, RowOp, SheetGateway, SheetTransport,
    StaticToken,
};

use crate::checkpoint::{self, row_hash, Checkpoint, SnapshotRow};
use crate::error::SyncError;
use crate::events::{EventSink, LogSink, SyncEvent};
use crate::planner::{self, PlannedWrite};
use crate::resolver::{self, ConflictPolicy, ConflictReport};

/// Where a cycle currently is. Mostly for status observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Fetching,
    Planning,
    Resolving,
    Applying,
    Committing,
    Failed,
}

/// Summary of one completed (or dry-run) cycle.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    /// Row operations actually applied (0 for dry runs).
    pub applied: usize,
    /// The resolved writes, for display.
    pub writes: Vec<PlannedWrite>,
    pub conflicts: Vec<ConflictReport>,
    pub dry_run: bool,
}

/// The orchestrator. One engine per ledger/sheet pair.
///
/// Mutual exclusion: `run_cycle` refuses re-entry while a cycle is in
/// flight, recording the trigger in a pending flag the scheduler drains
/// with [`SyncEngine::take_pending`] — repeated triggers coalesce into
/// one follow-up cycle.
pub struct SyncEngine<T: SheetTransport> {
    home: PathBuf,
    ledger: Arc<Ledger>,
    gateway: SheetGateway<T>,
    policy: ConflictPolicy,
    sink: Box<dyn EventSink>,
    phase: Mutex<CyclePhase>,
    in_flight: Mutex<()>,
    pending: AtomicBool,
}

impl<T: SheetTransport> SyncEngine<T> {
    pub fn new(
        home: &Path,
        ledger: Arc<Ledger>,
        gateway: SheetGateway<T>,
        policy: ConflictPolicy,
        sink: Box<dyn EventSink>,
    ) -> Self {
        Self {
            home: home.to_path_buf(),
            ledger,
            gateway,
            policy,
            sink,
            phase: Mutex::new(CyclePhase::Idle),
            in_flight: Mutex::new(()),
            pending: AtomicBool::new(false),
        }
    }

    /// Engine with the default log-only event sink.
    pub fn with_log_sink(
        home: &Path,
        ledger: Arc<Ledger>,
        gateway: SheetGateway<T>,
        policy: ConflictPolicy,
    ) -> Self {
        Self::new(home, ledger, gateway, policy, Box::new(LogSink))
    }

    pub fn phase(&self) -> CyclePhase {
        *self.phase.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Token for cooperative cancellation of the in-flight cycle; checked
    /// before every gateway call. A cancelled cycle commits nothing.
    pub fn cancel_token(&self) -> tally_gateway::CancelToken {
        self.gateway.cancel_token()
    }

    /// True if a trigger arrived while a cycle was running. Clears the flag.
    pub fn take_pending(&self) -> bool {
        self.pending.swap(false, Ordering::SeqCst)
    }

    /// Run one full reconciliation cycle.
    ///
    /// Returns [`SyncError::Busy`] (and records a pending trigger) if a
    /// cycle is already in flight. With `dry_run` the plan is computed and
    /// resolved but nothing is written and no checkpoint is committed.
    pub fn run_cycle(&self, dry_run: bool) -> Result<CycleOutcome, SyncError> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            self.pending.store(true, Ordering::SeqCst);
            return Err(SyncError::Busy);
        };

        self.sink.emit(SyncEvent::CycleStarted);
        let result = self.cycle(dry_run);
        match &result {
            Ok(outcome) => {
                self.set_phase(CyclePhase::Idle);
                if !outcome.dry_run {
                    self.sink.emit(SyncEvent::CycleSucceeded {
                        applied: outcome.applied,
                    });
                }
            }
            Err(err) => {
                self.set_phase(CyclePhase::Failed);
                self.sink.emit(SyncEvent::CycleFailed {
                    reason: err.to_string(),
                });
            }
        }
        result
    }

    fn cycle(&self, dry_run: bool) -> Result<CycleOutcome, SyncError> {
        self.set_phase(CyclePhase::Fetching);
        self.gateway.cancel_token().reset();
        let checkpoint = checkpoint::load_at(&self.home)?;
        let fetched = self.gateway.fetch_rows()?;

        // Planning is pure computation and cannot fail.
        self.set_phase(CyclePhase::Planning);
        let materialized = self.ledger.materialize();
        let items = self.ledger.items();
        let last_seq = self.ledger.last_seq();
        let plan = planner::plan(&materialized, &items, last_seq, &checkpoint, &fetched);

        self.set_phase(CyclePhase::Resolving);
        let resolution = resolver::resolve(plan, self.policy);
        for conflict in &resolution.conflicts {
            self.sink.emit(SyncEvent::ConflictDetected {
                item: conflict.item.clone(),
                outcome: conflict.outcome,
            });
        }

        if dry_run {
            return Ok(CycleOutcome {
                applied: 0,
                writes: resolution.writes,
                conflicts: resolution.conflicts,
                dry_run: true,
            });
        }

        self.set_phase(CyclePhase::Applying);
        let mut rows = checkpoint.rows.clone();
        let mut max_seq = last_seq;

        // Compensating adjustments first, so the ledger agrees with every
        // adopted external value before we touch the sheet.
        for adoption in &resolution.adoptions {
            let mut row = adoption.row.clone();
            if let Some(delta) = adoption.compensation {
                let draft = TxDraft::new(
                    adoption.item.clone(),
                    delta,
                    TxKind::Adjust,
                    "sheet-sync",
                )
                .with_note("reconcile to manual sheet edit");
                let seq = self.ledger.append(draft)?;
                row.seq = seq;
                max_seq = max_seq.max(seq);
            }
            rows.insert(adoption.item.clone(), row);
        }

        let ops: Vec<RowOp> = resolution.writes.iter().map(PlannedWrite::to_row_op).collect();
        let outcomes = self.gateway.apply_batch(&ops)?;

        self.set_phase(CyclePhase::Committing);
        for (write, outcome) in resolution.writes.iter().zip(&outcomes) {
            rows.insert(
                write.item.clone(),
                SnapshotRow {
                    index: outcome.index,
                    qty: write.qty,
                    seq: write.seq,
                    content_hash: row_hash(&write.cells),
                },
            );
            max_seq = max_seq.max(write.seq);
        }

        let new_checkpoint = Checkpoint {
            last_seq: max_seq,
            rows,
            synced_at: Utc::now(),
        };
        checkpoint::save_at(&self.home, &new_checkpoint)?;

        Ok(CycleOutcome {
            applied: ops.len(),
            writes: resolution.writes,
            conflicts: resolution.conflicts,
            dry_run: false,
        })
    }

    fn set_phase(&self, phase: CyclePhase) {
        *self.phase.lock().unwrap_or_else(|p| p.into_inner()) = phase;
    }
}

impl SyncEngine<Arc<dyn SheetTransport>> {
    /// Build an engine from process configuration: in-memory transport
    /// under `MOCK_SHEETS`, the Sheets HTTP transport otherwise.
    pub fn from_config(config: &Config, ledger: Arc<Ledger>) -> Self {
        let transport: Arc<dyn SheetTransport> = if config.mock_sheets {
            Arc::new(MemoryTransport::new())
        } else {
            let token = config.sheet_token.clone().unwrap_or_default();
            Arc::new(HttpTransport::new(
                &config.sheet_id,
                &config.sheet_name,
                Box::new(StaticToken(token)),
            ))
        };
        Self::with_log_sink(
            &config.home,
            ledger,
            SheetGateway::new(transport, GatewayConfig::default()),
            ConflictPolicy::default(),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
