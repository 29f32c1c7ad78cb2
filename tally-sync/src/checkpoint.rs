//! Checkpoint — the last confirmed correspondence between ledger state and
//! spreadsheet rows.
//!
//! Persists a single JSON document at `<home>/.tally/checkpoint.json`.
//! Writes use the same atomic `.tmp` + rename pattern as the ledger
//! catalog. The checkpoint is exclusively owned by the sync engine; all
//! other components read it at most.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use tally_core::ItemId;

use crate::error::{io_err, SyncError};

/// One spreadsheet row as last confirmed written by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRow {
    /// Absolute 1-based sheet row index.
    pub index: u64,
    pub qty: i64,
    /// Ledger sequence whose effects this row reflects.
    pub seq: u64,
    /// SHA-256 hex over the row cells; a mismatch against a fetched row
    /// means the row was edited outside the engine.
    pub content_hash: String,
}

/// Persisted checkpoint: last-applied sequence plus per-item row state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub last_seq: u64,
    pub rows: BTreeMap<ItemId, SnapshotRow>,
    pub synced_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn empty() -> Self {
        Self {
            last_seq: 0,
            rows: BTreeMap::new(),
            synced_at: Utc::now(),
        }
    }

    /// First data row index past every checkpointed row.
    pub fn next_free_index(&self) -> u64 {
        self.rows
            .values()
            .map(|r| r.index + 1)
            .max()
            .unwrap_or(tally_gateway::DATA_START_ROW)
    }
}

/// `<home>/.tally/checkpoint.json`
pub fn checkpoint_path_at(home: &Path) -> PathBuf {
    home.join(".tally").join("checkpoint.json")
}

/// Load the checkpoint, or an empty one if the file does not yet exist.
///
/// Unreadable JSON is [`SyncError::CheckpointCorrupt`] — never silently
/// replaced, since that would re-append every row on the next cycle.
pub fn load_at(home: &Path) -> Result<Checkpoint, SyncError> {
    let path = checkpoint_path_at(home);
    if !path.exists() {
        return Ok(Checkpoint::empty());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    serde_json::from_str(&contents).map_err(|e| SyncError::CheckpointCorrupt {
        path,
        detail: e.to_string(),
    })
}

/// Save the checkpoint atomically: write `<path>.tmp`, then rename.
pub fn save_at(home: &Path, checkpoint: &Checkpoint) -> Result<(), SyncError> {
    let path = checkpoint_path_at(home);
    let Some(dir) = path.parent() else {
        return Err(io_err(
            path,
            std::io::Error::other("invalid checkpoint path"),
        ));
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let json = serde_json::to_string_pretty(checkpoint)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}

/// Content hash over row cells. Cells are joined with a unit separator so
/// `["ab","c"]` and `["a","bc"]` never collide.
pub fn row_hash(cells: &[String]) -> String {
    let mut h = Sha256::new();
    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            h.update([0x1f]);
        }
        h.update(cell.as_bytes());
    }
    hex::encode(h.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cells(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_checkpoint_when_file_missing() {
        let home = TempDir::new().unwrap();
        let cp = load_at(home.path()).unwrap();
        assert_eq!(cp.last_seq, 0);
        assert!(cp.rows.is_empty());
    }

    #[test]
    fn roundtrip_save_load() {
        let home = TempDir::new().unwrap();
        let mut cp = Checkpoint::empty();
        cp.last_seq = 42;
        cp.rows.insert(
            ItemId::from("A"),
            SnapshotRow {
                index: 2,
                qty: 5,
                seq: 42,
                content_hash: row_hash(&cells(&["A", "Item A", "5", "pcs", "42"])),
            },
        );

        save_at(home.path(), &cp).unwrap();
        let loaded = load_at(home.path()).unwrap();
        assert_eq!(loaded.last_seq, 42);
        assert_eq!(loaded.rows, cp.rows);
    }

    #[test]
    fn tmp_file_cleaned_up_after_save() {
        let home = TempDir::new().unwrap();
        save_at(home.path(), &Checkpoint::empty()).unwrap();
        let tmp = checkpoint_path_at(home.path()).with_extension("json.tmp");
        assert!(!tmp.exists(), "tmp file should be removed after rename");
    }

    #[test]
    fn corrupt_checkpoint_is_a_hard_error() {
        let home = TempDir::new().unwrap();
        let path = checkpoint_path_at(home.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            load_at(home.path()),
            Err(SyncError::CheckpointCorrupt { .. })
        ));
    }

    #[test]
    fn row_hash_separates_cell_boundaries() {
        assert_ne!(
            row_hash(&cells(&["ab", "c"])),
            row_hash(&cells(&["a", "bc"]))
        );
        assert_eq!(row_hash(&cells(&["a", "b"])), row_hash(&cells(&["a", "b"])));
    }

    #[test]
    fn next_free_index_past_all_rows() {
        let mut cp = Checkpoint::empty();
        assert_eq!(cp.next_free_index(), 2);
        cp.rows.insert(
            ItemId::from("A"),
            SnapshotRow {
                index: 4,
                qty: 1,
                seq: 1,
                content_hash: String::new(),
            },
        );
        assert_eq!(cp.next_free_index(), 5);
    }
}
