//! Dry-run unified diff support for `tally diff`.
//!
//! Compares the sheet content the last checkpoint committed against the
//! content a sync would write now, entirely from local state. No network.

use std::collections::BTreeMap;
use std::path::Path;

use similar::TextDiff;

use tally_core::Ledger;

use crate::checkpoint;
use crate::error::SyncError;
use crate::planner::{self, render_cells, WriteTarget};

/// Unified diff of the sheet, before vs after a hypothetical sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetDiff {
    pub unified_diff: String,
}

impl SheetDiff {
    pub fn is_empty(&self) -> bool {
        self.unified_diff.is_empty()
    }
}

/// Compute what `sync` would change on the sheet, rendered as a unified
/// diff over tab-separated rows in row-index order.
///
/// The "before" side is reconstructed from the checkpoint, so rows edited
/// externally since the last sync are not visible here; `sync --dry-run`
/// shows those.
pub fn diff_sheet(home: &Path, ledger: &Ledger) -> Result<SheetDiff, SyncError> {
    let cp = checkpoint::load_at(home)?;
    let materialized = ledger.materialize();
    let items = ledger.items();
    let last_seq = ledger.last_seq();

    let mut before: BTreeMap<u64, Vec<String>> = BTreeMap::new();
    for (item, snap) in &cp.rows {
        let meta = items
            .get(item)
            .cloned()
            .unwrap_or_else(|| tally_core::ItemMeta::fallback(item));
        before.insert(snap.index, render_cells(item, &meta, snap.qty, snap.seq));
    }

    let mut after = before.clone();
    let mut next_index = cp.next_free_index();
    for write in planner::local_writes(&materialized, &items, last_seq, &cp) {
        match write.target {
            WriteTarget::Update { index } => {
                after.insert(index, write.cells);
            }
            WriteTarget::Append => {
                after.insert(next_index, write.cells);
                next_index += 1;
            }
        }
    }

    let old = render_rows(&before);
    let new = render_rows(&after);
    if old == new {
        return Ok(SheetDiff {
            unified_diff: String::new(),
        });
    }

    let unified = TextDiff::from_lines(&old, &new)
        .unified_diff()
        .header("a/sheet", "b/sheet")
        .context_radius(3)
        .to_string();
    Ok(SheetDiff {
        unified_diff: unified,
    })
}

fn render_rows(rows: &BTreeMap<u64, Vec<String>>) -> String {
    let mut out = String::new();
    for cells in rows.values() {
        out.push_str(&cells.join("\t"));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    use tally_core::{ItemId, TxDraft, TxKind};

    use crate::checkpoint::{row_hash, Checkpoint, SnapshotRow};

    #[test]
    fn empty_ledger_has_no_diff() {
        let home = TempDir::new().expect("home");
        let ledger = Ledger::open_at(home.path()).expect("ledger");
        let diff = diff_sheet(home.path(), &ledger).expect("diff");
        assert!(diff.is_empty());
    }

    #[test]
    fn new_item_shows_as_added_row() {
        let home = TempDir::new().expect("home");
        let ledger = Ledger::open_at(home.path()).expect("ledger");
        ledger
            .append(TxDraft::new("widget", 5, TxKind::Receive, "tester"))
            .expect("append");

        let diff = diff_sheet(home.path(), &ledger).expect("diff");
        assert!(diff.unified_diff.contains("--- a/sheet"));
        assert!(diff.unified_diff.contains("+++ b/sheet"));
        assert!(diff.unified_diff.contains("+widget"));
    }

    #[test]
    fn quantity_change_shows_old_and_new_row() {
        let home = TempDir::new().expect("home");
        let ledger = Ledger::open_at(home.path()).expect("ledger");
        ledger
            .append(TxDraft::new("widget", 5, TxKind::Receive, "tester"))
            .expect("append");

        // Checkpoint reflects a sync at qty 3.
        let meta = ledger
            .items()
            .get(&ItemId::from("widget"))
            .cloned()
            .expect("meta");
        let cells = render_cells(&ItemId::from("widget"), &meta, 3, 1);
        let mut cp = Checkpoint::empty();
        cp.last_seq = 1;
        cp.rows.insert(
            ItemId::from("widget"),
            SnapshotRow {
                index: 2,
                qty: 3,
                seq: 1,
                content_hash: row_hash(&cells),
            },
        );
        checkpoint::save_at(home.path(), &cp).expect("save");

        let diff = diff_sheet(home.path(), &ledger).expect("diff");
        assert!(diff.unified_diff.contains("-widget\twidget\t3"));
        assert!(diff.unified_diff.contains("+widget\twidget\t5"));
    }

    #[test]
    fn synced_state_produces_no_noise() {
        let home = TempDir::new().expect("home");
        let ledger = Ledger::open_at(home.path()).expect("ledger");
        ledger
            .append(TxDraft::new("widget", 5, TxKind::Receive, "tester"))
            .expect("append");

        let meta = ledger
            .items()
            .get(&ItemId::from("widget"))
            .cloned()
            .expect("meta");
        let cells = render_cells(&ItemId::from("widget"), &meta, 5, 1);
        let mut cp = Checkpoint::empty();
        cp.last_seq = 1;
        cp.rows.insert(
            ItemId::from("widget"),
            SnapshotRow {
                index: 2,
                qty: 5,
                seq: 1,
                content_hash: row_hash(&cells),
            },
        );
        checkpoint::save_at(home.path(), &cp).expect("save");

        let diff = diff_sheet(home.path(), &ledger).expect("diff");
        assert!(diff.is_empty());
    }
}
