//! Reconciliation planner — pure computation, no I/O.
//!
//! Given the ledger's materialized quantities, the last checkpoint, and a
//! freshly fetched set of sheet rows, produce the minimal ordered set of
//! row writes to converge, plus the externally edited rows for the
//! conflict resolver. Determinism matters: updates before appends, each
//! group in item order, so identical inputs always yield identical plans.

use std::collections::BTreeMap;

use tally_core::{ItemId, ItemMeta};
use tally_gateway::{RowOp, SheetRow};

use crate::checkpoint::{row_hash, Checkpoint};

/// Row cell layout: `[item_id, display_name, qty, unit, seq]`.
pub const CELL_ITEM: usize = 0;
pub const CELL_NAME: usize = 1;
pub const CELL_QTY: usize = 2;
pub const CELL_UNIT: usize = 3;
pub const CELL_SEQ: usize = 4;

/// Render the engine's cells for one item row.
pub fn render_cells(item: &ItemId, meta: &ItemMeta, qty: i64, seq: u64) -> Vec<String> {
    vec![
        item.0.clone(),
        meta.name.clone(),
        qty.to_string(),
        meta.unit.clone(),
        seq.to_string(),
    ]
}

/// Parse the quantity cell of a fetched row, if present and numeric.
pub fn parse_qty(cells: &[String]) -> Option<i64> {
    cells.get(CELL_QTY)?.trim().parse().ok()
}

fn parse_item(cells: &[String]) -> Option<ItemId> {
    let id = cells.get(CELL_ITEM)?.trim();
    if id.is_empty() {
        return None;
    }
    Some(ItemId::from(id))
}

/// Where a planned write lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteTarget {
    /// Overwrite the item's checkpointed row.
    Update { index: u64 },
    /// Add a new row after the last known one.
    Append,
}

/// One planned row write, with enough context for the resolver and for
/// checkpoint construction after application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedWrite {
    pub item: ItemId,
    pub target: WriteTarget,
    pub qty: i64,
    pub seq: u64,
    pub cells: Vec<String>,
}

impl PlannedWrite {
    pub fn is_update(&self) -> bool {
        matches!(self.target, WriteTarget::Update { .. })
    }

    pub fn to_row_op(&self) -> RowOp {
        match self.target {
            WriteTarget::Update { index } => RowOp::Update {
                index,
                cells: self.cells.clone(),
            },
            WriteTarget::Append => RowOp::Append {
                cells: self.cells.clone(),
            },
        }
    }
}

/// A checkpointed row that no longer matches its stored content hash —
/// edited (or deleted) outside the engine. Not yet a write; the resolver
/// decides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftCandidate {
    pub item: ItemId,
    /// Fetched row index, or the checkpointed index when the row is gone.
    pub index: u64,
    pub external_cells: Vec<String>,
    /// The item's row is absent from the fetched set entirely.
    pub row_missing: bool,
    /// Sequence recorded in the checkpoint for this row.
    pub checkpoint_seq: u64,
    /// Ledger-derived quantity at plan time.
    pub engine_qty: i64,
    /// The cells the engine would write for this item right now.
    pub engine_cells: Vec<String>,
}

/// Ephemeral per-cycle plan. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub writes: Vec<PlannedWrite>,
    pub drift: Vec<DriftCandidate>,
    /// Ledger sequence the plan's quantities reflect.
    pub last_seq: u64,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.drift.is_empty()
    }
}

fn meta_for<'a>(items: &'a BTreeMap<ItemId, ItemMeta>, item: &ItemId) -> ItemMeta {
    items
        .get(item)
        .cloned()
        .unwrap_or_else(|| ItemMeta::fallback(item))
}

/// The ledger-vs-checkpoint half of planning: updates for changed
/// quantities, appends for items the sheet has never seen. Needs no
/// fetched rows, so `tally status`/`tally diff` can run offline.
pub fn local_writes(
    materialized: &BTreeMap<ItemId, i64>,
    items: &BTreeMap<ItemId, ItemMeta>,
    last_seq: u64,
    checkpoint: &Checkpoint,
) -> Vec<PlannedWrite> {
    let mut writes = Vec::new();

    // Updates first: they reference fixed row indices.
    for (item, qty) in materialized {
        if let Some(snap) = checkpoint.rows.get(item) {
            if *qty != snap.qty {
                let meta = meta_for(items, item);
                writes.push(PlannedWrite {
                    item: item.clone(),
                    target: WriteTarget::Update { index: snap.index },
                    qty: *qty,
                    seq: last_seq,
                    cells: render_cells(item, &meta, *qty, last_seq),
                });
            }
        }
    }

    // Then appends, always after the last known row.
    for (item, qty) in materialized {
        if !checkpoint.rows.contains_key(item) {
            let meta = meta_for(items, item);
            writes.push(PlannedWrite {
                item: item.clone(),
                target: WriteTarget::Append,
                qty: *qty,
                seq: last_seq,
                cells: render_cells(item, &meta, *qty, last_seq),
            });
        }
    }

    writes
}

/// Full plan: local writes plus drift candidates from the fetched rows.
pub fn plan(
    materialized: &BTreeMap<ItemId, i64>,
    items: &BTreeMap<ItemId, ItemMeta>,
    last_seq: u64,
    checkpoint: &Checkpoint,
    fetched: &[SheetRow],
) -> Plan {
    let mut fetched_by_item: BTreeMap<ItemId, &SheetRow> = BTreeMap::new();
    for row in fetched {
        if let Some(item) = parse_item(&row.cells) {
            // First occurrence wins; duplicate ids are a sheet defect the
            // engine leaves alone.
            fetched_by_item.entry(item).or_insert(row);
        }
    }

    let mut drift = Vec::new();
    for (item, snap) in &checkpoint.rows {
        let engine_qty = materialized.get(item).copied().unwrap_or(0);
        let meta = meta_for(items, item);
        let engine_cells = render_cells(item, &meta, engine_qty, last_seq);
        match fetched_by_item.get(item) {
            Some(row) => {
                if row_hash(&row.cells) != snap.content_hash {
                    drift.push(DriftCandidate {
                        item: item.clone(),
                        index: row.index,
                        external_cells: row.cells.clone(),
                        row_missing: false,
                        checkpoint_seq: snap.seq,
                        engine_qty,
                        engine_cells,
                    });
                }
            }
            None => drift.push(DriftCandidate {
                item: item.clone(),
                index: snap.index,
                external_cells: Vec::new(),
                row_missing: true,
                checkpoint_seq: snap.seq,
                engine_qty,
                engine_cells,
            }),
        }
    }

    let mut writes = local_writes(materialized, items, last_seq, checkpoint);

    // Row positions come from the fetched sheet, never the checkpoint:
    // checkpointed indices go stale when earlier rows are deleted, and a
    // planned append may find its row already present (added by hand, or
    // written by a cycle that died before committing). Whenever the item
    // has a live row, the write targets that row.
    for write in &mut writes {
        if let Some(row) = fetched_by_item.get(&write.item) {
            write.target = WriteTarget::Update { index: row.index };
        }
    }
    writes.sort_by(|a, b| (!a.is_update(), &a.item).cmp(&(!b.is_update(), &b.item)));

    Plan {
        writes,
        drift,
        last_seq,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::SnapshotRow;

    fn item(id: &str) -> ItemId {
        ItemId::from(id)
    }

    fn meta(name: &str) -> ItemMeta {
        ItemMeta {
            name: name.to_string(),
            unit: "pcs".to_string(),
        }
    }

    fn snap_for(index: u64, qty: i64, seq: u64, cells: &[String]) -> SnapshotRow {
        SnapshotRow {
            index,
            qty,
            seq,
            content_hash: row_hash(cells),
        }
    }

    fn sheet_row(index: u64, cells: &[String]) -> SheetRow {
        SheetRow {
            index,
            cells: cells.to_vec(),
        }
    }

    #[test]
    fn example_update_then_append() {
        // Ledger: A qty 5 (seq 10), B qty 0 (new). Checkpoint: A at qty 3,
        // row 2, seq 8. Expect: update row 2 -> qty 5 seq 10, then append B.
        let mut materialized = BTreeMap::new();
        materialized.insert(item("A"), 5);
        materialized.insert(item("B"), 0);
        let mut items = BTreeMap::new();
        items.insert(item("A"), meta("Item A"));
        items.insert(item("B"), meta("Item B"));

        let a_cells = render_cells(&item("A"), &meta("Item A"), 3, 8);
        let mut cp = Checkpoint::empty();
        cp.last_seq = 8;
        cp.rows.insert(item("A"), snap_for(2, 3, 8, &a_cells));

        let fetched = vec![sheet_row(2, &a_cells)];
        let plan = plan(&materialized, &items, 10, &cp, &fetched);

        assert!(plan.drift.is_empty());
        assert_eq!(plan.writes.len(), 2);
        assert_eq!(plan.writes[0].item, item("A"));
        assert_eq!(
            plan.writes[0].target,
            WriteTarget::Update { index: 2 }
        );
        assert_eq!(plan.writes[0].qty, 5);
        assert_eq!(plan.writes[0].seq, 10);
        assert_eq!(plan.writes[1].item, item("B"));
        assert_eq!(plan.writes[1].target, WriteTarget::Append);
        assert_eq!(plan.writes[1].qty, 0);
    }

    #[test]
    fn unchanged_state_gives_empty_plan() {
        let mut materialized = BTreeMap::new();
        materialized.insert(item("A"), 3);
        let mut items = BTreeMap::new();
        items.insert(item("A"), meta("Item A"));

        let cells = render_cells(&item("A"), &meta("Item A"), 3, 8);
        let mut cp = Checkpoint::empty();
        cp.rows.insert(item("A"), snap_for(2, 3, 8, &cells));

        let plan = plan(&materialized, &items, 8, &cp, &[sheet_row(2, &cells)]);
        assert!(plan.is_empty());
    }

    #[test]
    fn updates_precede_appends_and_groups_are_item_sorted() {
        let mut materialized = BTreeMap::new();
        for (id, qty) in [("Z", 9), ("B", 2), ("M", 5), ("A", 1)] {
            materialized.insert(item(id), qty);
        }
        let items = BTreeMap::new();

        let mut cp = Checkpoint::empty();
        // Z and B are checkpointed with stale quantities; M and A are new.
        cp.rows.insert(item("Z"), snap_for(2, 1, 1, &[]));
        cp.rows.insert(item("B"), snap_for(3, 1, 1, &[]));

        let writes = local_writes(&materialized, &items, 7, &cp);
        let order: Vec<(&str, bool)> = writes
            .iter()
            .map(|w| (w.item.0.as_str(), w.is_update()))
            .collect();
        assert_eq!(
            order,
            vec![("B", true), ("Z", true), ("A", false), ("M", false)]
        );
    }

    #[test]
    fn externally_edited_row_becomes_drift_not_write() {
        let mut materialized = BTreeMap::new();
        materialized.insert(item("A"), 3);
        let mut items = BTreeMap::new();
        items.insert(item("A"), meta("Item A"));

        let written = render_cells(&item("A"), &meta("Item A"), 3, 8);
        let mut cp = Checkpoint::empty();
        cp.rows.insert(item("A"), snap_for(2, 3, 8, &written));

        // Someone bumped the qty cell by hand.
        let mut edited = written.clone();
        edited[CELL_QTY] = "7".to_string();

        let plan = plan(&materialized, &items, 8, &cp, &[sheet_row(2, &edited)]);
        assert!(plan.writes.is_empty());
        assert_eq!(plan.drift.len(), 1);
        let d = &plan.drift[0];
        assert_eq!(d.item, item("A"));
        assert!(!d.row_missing);
        assert_eq!(d.external_cells[CELL_QTY], "7");
        assert_eq!(d.engine_qty, 3);
    }

    #[test]
    fn missing_row_is_drift_with_row_missing() {
        let mut materialized = BTreeMap::new();
        materialized.insert(item("A"), 3);
        let items = BTreeMap::new();

        let mut cp = Checkpoint::empty();
        cp.rows.insert(item("A"), snap_for(4, 3, 8, &[]));

        let plan = plan(&materialized, &items, 8, &cp, &[]);
        assert_eq!(plan.drift.len(), 1);
        assert!(plan.drift[0].row_missing);
        assert_eq!(plan.drift[0].index, 4);
    }

    #[test]
    fn uncheckpointed_fetched_row_turns_append_into_update() {
        // Row exists on the sheet but the checkpoint never recorded it,
        // as after a cycle that died between write and commit.
        let mut materialized = BTreeMap::new();
        materialized.insert(item("B"), 2);
        let mut items = BTreeMap::new();
        items.insert(item("B"), meta("Item B"));

        let cells = render_cells(&item("B"), &meta("Item B"), 2, 4);
        let cp = Checkpoint::empty();

        let plan = plan(&materialized, &items, 4, &cp, &[sheet_row(3, &cells)]);
        assert_eq!(plan.writes.len(), 1);
        assert_eq!(plan.writes[0].target, WriteTarget::Update { index: 3 });
    }

    #[test]
    fn qty_parsing_tolerates_whitespace_and_rejects_text() {
        assert_eq!(parse_qty(&["A".into(), "n".into(), " 42 ".into()]), Some(42));
        assert_eq!(parse_qty(&["A".into(), "n".into(), "lots".into()]), None);
        assert_eq!(parse_qty(&["A".into()]), None);
    }
}
