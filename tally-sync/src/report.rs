//! Sheet freshness reporting.
//!
//! Signal precedence:
//! 1. `NeverSynced` (no checkpoint on disk)
//! 2. `Pending` (ledger transactions not yet reflected in the checkpoint)
//! 3. `Current`
//!
//! Everything here works from the ledger and the checkpoint alone, so
//! `tally status` answers without touching the network.

use std::path::Path;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tally_core::Ledger;

use crate::checkpoint::{self, Checkpoint};
use crate::error::SyncError;
use crate::planner;

/// Freshness of the external sheet relative to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SheetState {
    NeverSynced,
    Pending { ops: usize },
    Current,
}

/// Full status snapshot, shaped for both table and JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    #[serde(flatten)]
    pub sheet: SheetState,
    pub ledger_seq: u64,
    pub checkpoint_seq: u64,
    pub items: usize,
    pub synced_at: Option<DateTime<Utc>>,
}

/// Classify sheet freshness from the ledger and checkpoint.
pub fn check(home: &Path, ledger: &Ledger) -> Result<StatusReport, SyncError> {
    let path = checkpoint::checkpoint_path_at(home);
    let materialized = ledger.materialize();
    let ledger_seq = ledger.last_seq();
    let items = materialized.len();

    if !path.exists() {
        return Ok(StatusReport {
            sheet: SheetState::NeverSynced,
            ledger_seq,
            checkpoint_seq: 0,
            items,
            synced_at: None,
        });
    }

    let cp = checkpoint::load_at(home)?;
    let sheet = match pending_ops(&materialized, ledger, ledger_seq, &cp) {
        0 => SheetState::Current,
        ops => SheetState::Pending { ops },
    };
    Ok(StatusReport {
        sheet,
        ledger_seq,
        checkpoint_seq: cp.last_seq,
        items,
        synced_at: Some(cp.synced_at),
    })
}

fn pending_ops(
    materialized: &std::collections::BTreeMap<tally_core::ItemId, i64>,
    ledger: &Ledger,
    ledger_seq: u64,
    checkpoint: &Checkpoint,
) -> usize {
    planner::local_writes(materialized, &ledger.items(), ledger_seq, checkpoint).len()
}

/// Format age from a chrono timestamp (checkpoint `synced_at`).
pub fn format_datetime_age(timestamp: DateTime<Utc>) -> String {
    let age = Utc::now()
        .signed_duration_since(timestamp)
        .num_seconds()
        .max(0) as u64;
    format_seconds(age)
}

/// Format age from a filesystem timestamp.
pub fn format_system_time_age(timestamp: SystemTime) -> String {
    let age = SystemTime::now()
        .duration_since(timestamp)
        .unwrap_or_default();
    format_seconds(age.as_secs())
}

fn format_seconds(seconds: u64) -> String {
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 60 * 60 {
        return format!("{}m", seconds / 60);
    }
    if seconds < 60 * 60 * 24 {
        return format!("{}h", seconds / (60 * 60));
    }
    format!("{}d", seconds / (60 * 60 * 24))
}
