//! Conflict resolver — classifies external edits and applies the
//! configured policy.
//!
//! Classification per drift candidate:
//! - no pending engine write: **benign drift** — the external value is
//!   adopted into the checkpoint (and the ledger, via a compensating
//!   adjustment, so quantities stay equal to the delta sum).
//! - pending engine write to the same row: **true conflict** — resolved
//!   per [`ConflictPolicy`], always surfaced as an event by the engine.
//! - unparseable quantity or deleted row: the engine's row is restored.

use serde::{Deserialize, Serialize};

use tally_core::ItemId;

use crate::checkpoint::{row_hash, SnapshotRow};
use crate::planner::{parse_qty, Plan, PlannedWrite, WriteTarget};

/// Which side wins a true conflict.
///
/// Default is ledger-wins: the ledger is the append-only system of record
/// and the sheet is a projection of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    #[default]
    LedgerWins,
    ExternalWins,
}

/// How one conflict ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictOutcome {
    /// Engine value overwrites the external edit (ledger-wins).
    LedgerKept,
    /// External value adopted; a compensating adjustment reconciles the
    /// ledger (external-wins).
    ExternalAdopted,
    /// The external cell was unusable (non-numeric qty); the engine's row
    /// is rewritten.
    Repaired,
    /// The row was deleted externally; the engine re-appends it.
    Reappended,
}

impl std::fmt::Display for ConflictOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictOutcome::LedgerKept => write!(f, "ledger_kept"),
            ConflictOutcome::ExternalAdopted => write!(f, "external_adopted"),
            ConflictOutcome::Repaired => write!(f, "repaired"),
            ConflictOutcome::Reappended => write!(f, "reappended"),
        }
    }
}

/// A resolved true conflict, reported as an observable event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictReport {
    pub item: ItemId,
    pub outcome: ConflictOutcome,
    pub external_qty: Option<i64>,
    pub engine_qty: i64,
}

/// An external value accepted into the checkpoint. When `compensation` is
/// set, the engine appends an adjustment of that delta to the ledger and
/// stamps the row's seq with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adoption {
    pub item: ItemId,
    pub row: SnapshotRow,
    pub compensation: Option<i64>,
}

/// Output of conflict resolution: the final ordered writes, checkpoint
/// adoptions, and the conflicts to report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub writes: Vec<PlannedWrite>,
    pub adoptions: Vec<Adoption>,
    pub conflicts: Vec<ConflictReport>,
}

impl Resolution {
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.adoptions.is_empty()
    }
}

/// Apply `policy` to the plan's drift candidates.
pub fn resolve(plan: Plan, policy: ConflictPolicy) -> Resolution {
    let Plan {
        mut writes,
        drift,
        last_seq,
    } = plan;

    let mut adoptions = Vec::new();
    let mut conflicts = Vec::new();

    for candidate in drift {
        let pending = writes.iter().position(|w| w.item == candidate.item);

        if candidate.row_missing {
            // The row vanished from the sheet. Ledger wins over deletion
            // regardless of policy: re-append the engine's row.
            match pending {
                Some(i) => writes[i].target = WriteTarget::Append,
                None => writes.push(PlannedWrite {
                    item: candidate.item.clone(),
                    target: WriteTarget::Append,
                    qty: candidate.engine_qty,
                    seq: last_seq,
                    cells: candidate.engine_cells.clone(),
                }),
            }
            conflicts.push(ConflictReport {
                item: candidate.item,
                outcome: ConflictOutcome::Reappended,
                external_qty: None,
                engine_qty: candidate.engine_qty,
            });
            continue;
        }

        let Some(external_qty) = parse_qty(&candidate.external_cells) else {
            // Manual edit destroyed the quantity cell; restore our row.
            if pending.is_none() {
                writes.push(PlannedWrite {
                    item: candidate.item.clone(),
                    target: WriteTarget::Update {
                        index: candidate.index,
                    },
                    qty: candidate.engine_qty,
                    seq: last_seq,
                    cells: candidate.engine_cells.clone(),
                });
            }
            conflicts.push(ConflictReport {
                item: candidate.item,
                outcome: ConflictOutcome::Repaired,
                external_qty: None,
                engine_qty: candidate.engine_qty,
            });
            continue;
        };

        let adoption = Adoption {
            item: candidate.item.clone(),
            row: SnapshotRow {
                index: candidate.index,
                qty: external_qty,
                seq: candidate.checkpoint_seq,
                content_hash: row_hash(&candidate.external_cells),
            },
            compensation: (external_qty != candidate.engine_qty)
                .then_some(external_qty - candidate.engine_qty),
        };

        match pending {
            // Benign drift: accept the manual correction, no engine write.
            None => {
                tracing::debug!(
                    "benign sheet edit on '{}': adopting qty {external_qty}",
                    candidate.item
                );
                adoptions.push(adoption);
            }
            // True conflict: an engine update targets the same row.
            Some(i) => match policy {
                ConflictPolicy::LedgerWins => {
                    tracing::info!(
                        "conflict on '{}': keeping ledger qty {}, discarding external {external_qty}",
                        candidate.item,
                        candidate.engine_qty
                    );
                    conflicts.push(ConflictReport {
                        item: candidate.item,
                        outcome: ConflictOutcome::LedgerKept,
                        external_qty: Some(external_qty),
                        engine_qty: candidate.engine_qty,
                    });
                }
                ConflictPolicy::ExternalWins => {
                    writes.remove(i);
                    conflicts.push(ConflictReport {
                        item: candidate.item.clone(),
                        outcome: ConflictOutcome::ExternalAdopted,
                        external_qty: Some(external_qty),
                        engine_qty: candidate.engine_qty,
                    });
                    adoptions.push(adoption);
                }
            },
        }
    }

    // Restore the invariant ordering after target rewrites: updates
    // before appends, each group sorted by item.
    writes.sort_by(|a, b| {
        b.is_update()
            .cmp(&a.is_update())
            .then_with(|| a.item.cmp(&b.item))
    });

    Resolution {
        writes,
        adoptions,
        conflicts,
    }
}
