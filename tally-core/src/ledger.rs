//! Append-only transaction ledger.
//!
//! # Storage layout
//!
//! ```text
//! <home>/.tally/
//!   ledger/
//!     ledger.log   (JSON lines, one Transaction per line, fsynced)
//!     items.json   (item catalog — atomic .tmp + rename)
//! ```
//!
//! The log is the system of record: sequence numbers are assigned here,
//! strictly increasing and gap-free. `open_at` replays the whole log and
//! refuses to start on a gap or unparsable line.
//!
//! # API pattern
//!
//! Constructors take an explicit `home: &Path`; tests always use a
//! `TempDir` home, never the real one.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;

use crate::error::{io_err, LedgerError};
use crate::types::{ItemId, ItemMeta, Transaction, TxDraft};

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.tally/ledger/`
pub fn ledger_dir_at(home: &Path) -> PathBuf {
    home.join(".tally").join("ledger")
}

/// `<home>/.tally/ledger/ledger.log`
pub fn log_path_at(home: &Path) -> PathBuf {
    ledger_dir_at(home).join("ledger.log")
}

/// `<home>/.tally/ledger/items.json`
pub fn catalog_path_at(home: &Path) -> PathBuf {
    ledger_dir_at(home).join("items.json")
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Inner {
    last_seq: u64,
    quantities: BTreeMap<ItemId, i64>,
    items: BTreeMap<ItemId, ItemMeta>,
    log: File,
}

/// Durable append-only ledger with a derived quantity index.
///
/// Appends are serialized behind one mutex, which also serializes
/// same-item appends as the non-negative invariant requires. Reads
/// (`materialize`, `read_since`) never block on a spreadsheet round trip;
/// they touch only local state.
#[derive(Debug)]
pub struct Ledger {
    home: PathBuf,
    inner: Mutex<Inner>,
}

impl Ledger {
    /// Open (or create) the ledger under `home`, replaying the full log.
    ///
    /// Returns [`LedgerError::Corrupt`] on a sequence gap, a non-monotonic
    /// sequence, or an unparsable line — startup must halt on those.
    pub fn open_at(home: &Path) -> Result<Self, LedgerError> {
        let dir = ledger_dir_at(home);
        std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;

        let log_path = log_path_at(home);
        let mut last_seq = 0u64;
        let mut quantities = BTreeMap::new();

        if log_path.exists() {
            let file = File::open(&log_path).map_err(|e| io_err(&log_path, e))?;
            for (lineno, line) in BufReader::new(file).lines().enumerate() {
                let line = line.map_err(|e| io_err(&log_path, e))?;
                if line.trim().is_empty() {
                    continue;
                }
                let tx: Transaction =
                    serde_json::from_str(&line).map_err(|e| LedgerError::Corrupt {
                        path: log_path.clone(),
                        detail: format!("line {}: {e}", lineno + 1),
                    })?;
                if tx.seq != last_seq + 1 {
                    return Err(LedgerError::Corrupt {
                        path: log_path.clone(),
                        detail: format!(
                            "line {}: seq {} after {} (must be gap-free and increasing)",
                            lineno + 1,
                            tx.seq,
                            last_seq
                        ),
                    });
                }
                last_seq = tx.seq;
                *quantities.entry(tx.item).or_insert(0) += tx.delta;
            }
        }

        let items = load_catalog(home)?;

        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| io_err(&log_path, e))?;

        Ok(Self {
            home: home.to_path_buf(),
            inner: Mutex::new(Inner {
                last_seq,
                quantities,
                items,
                log,
            }),
        })
    }

    /// Append one transaction. Durable before this returns: the log line
    /// is written and synced, so no acknowledged transaction can be lost.
    ///
    /// Fails with [`LedgerError::Validation`] if the delta sign is wrong
    /// for the kind, or if the resulting quantity would go negative and
    /// the kind does not bypass the balance check.
    pub fn append(&self, draft: TxDraft) -> Result<u64, LedgerError> {
        let mut inner = self.lock();

        if !draft.kind.validate_delta(draft.delta) {
            return Err(LedgerError::bad_sign(&draft.item, draft.kind, draft.delta));
        }

        let current = inner.quantities.get(&draft.item).copied().unwrap_or(0);
        let resulting = current + draft.delta;
        if resulting < 0 && !draft.kind.bypasses_balance_check() {
            return Err(LedgerError::negative_balance(
                &draft.item,
                draft.kind,
                resulting,
            ));
        }

        let tx = Transaction {
            seq: inner.last_seq + 1,
            item: draft.item.clone(),
            delta: draft.delta,
            kind: draft.kind,
            timestamp: Utc::now(),
            actor: draft.actor,
            note: draft.note,
        };

        let log_path = log_path_at(&self.home);
        let mut line = serde_json::to_string(&tx)?;
        line.push('\n');
        inner
            .log
            .write_all(line.as_bytes())
            .map_err(|e| io_err(&log_path, e))?;
        inner.log.sync_data().map_err(|e| io_err(&log_path, e))?;

        inner.last_seq = tx.seq;
        *inner.quantities.entry(tx.item.clone()).or_insert(0) += tx.delta;

        if !inner.items.contains_key(&tx.item) {
            let meta = match (draft.display_name, draft.unit) {
                (Some(name), Some(unit)) => ItemMeta { name, unit },
                (Some(name), None) => ItemMeta {
                    name,
                    unit: ItemMeta::fallback(&tx.item).unit,
                },
                (None, Some(unit)) => ItemMeta {
                    name: tx.item.0.clone(),
                    unit,
                },
                (None, None) => ItemMeta::fallback(&tx.item),
            };
            inner.items.insert(tx.item.clone(), meta);
            save_catalog(&self.home, &inner.items)?;
        }

        Ok(tx.seq)
    }

    /// Stream transactions with `seq > after_seq` from disk, in order.
    ///
    /// Lazy and restartable: the ledger may keep appending while the
    /// iterator runs; it observes a finite prefix.
    pub fn read_since(&self, after_seq: u64) -> Result<ReadSince, LedgerError> {
        let log_path = log_path_at(&self.home);
        let reader = if log_path.exists() {
            let file = File::open(&log_path).map_err(|e| io_err(&log_path, e))?;
            Some(BufReader::new(file))
        } else {
            None
        };
        Ok(ReadSince {
            path: log_path,
            reader,
            after_seq,
        })
    }

    /// Current quantity per item, reflecting every transaction applied so
    /// far. Items with transactions always appear, even at quantity zero.
    pub fn materialize(&self) -> BTreeMap<ItemId, i64> {
        self.lock().quantities.clone()
    }

    /// Highest assigned sequence number (0 for an empty ledger).
    pub fn last_seq(&self) -> u64 {
        self.lock().last_seq
    }

    /// Snapshot of the item catalog.
    pub fn items(&self) -> BTreeMap<ItemId, ItemMeta> {
        self.lock().items.clone()
    }

    /// The most recent `n` transactions, oldest first.
    pub fn recent(&self, n: usize) -> Result<Vec<Transaction>, LedgerError> {
        let last = self.last_seq();
        let after = last.saturating_sub(n as u64);
        self.read_since(after)?.collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Recover from poisoning: the ledger state is rebuilt from the log
        // on restart, so a poisoned guard holds nothing unrecoverable.
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Iterator over log lines past a checkpoint sequence.
#[derive(Debug)]
pub struct ReadSince {
    path: PathBuf,
    reader: Option<BufReader<File>>,
    after_seq: u64,
}

impl Iterator for ReadSince {
    type Item = Result<Transaction, LedgerError>;

    fn next(&mut self) -> Option<Self::Item> {
        let reader = self.reader.as_mut()?;
        loop {
            let mut line = String::new();
            match reader.read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(io_err(&self.path, e))),
            }
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Transaction>(line.trim_end()) {
                Ok(tx) if tx.seq > self.after_seq => return Some(Ok(tx)),
                Ok(_) => continue,
                Err(e) => {
                    return Some(Err(LedgerError::Corrupt {
                        path: self.path.clone(),
                        detail: e.to_string(),
                    }))
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Item catalog persistence
// ---------------------------------------------------------------------------

fn load_catalog(home: &Path) -> Result<BTreeMap<ItemId, ItemMeta>, LedgerError> {
    let path = catalog_path_at(home);
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    serde_json::from_str(&contents).map_err(|e| LedgerError::Corrupt {
        path,
        detail: e.to_string(),
    })
}

fn save_catalog(home: &Path, items: &BTreeMap<ItemId, ItemMeta>) -> Result<(), LedgerError> {
    let path = catalog_path_at(home);
    let json = serde_json::to_string_pretty(items)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TxKind;
    use tempfile::TempDir;

    fn receive(item: &str, qty: i64) -> TxDraft {
        TxDraft::new(item, qty, TxKind::Receive, "tester")
    }

    #[test]
    fn append_assigns_increasing_seqs() {
        let home = TempDir::new().unwrap();
        let ledger = Ledger::open_at(home.path()).unwrap();
        assert_eq!(ledger.append(receive("A", 5)).unwrap(), 1);
        assert_eq!(ledger.append(receive("B", 3)).unwrap(), 2);
        assert_eq!(ledger.last_seq(), 2);
    }

    #[test]
    fn materialize_sums_deltas() {
        let home = TempDir::new().unwrap();
        let ledger = Ledger::open_at(home.path()).unwrap();
        ledger.append(receive("A", 5)).unwrap();
        ledger
            .append(TxDraft::new("A", -2, TxKind::Issue, "tester"))
            .unwrap();
        ledger.append(receive("B", 1)).unwrap();

        let q = ledger.materialize();
        assert_eq!(q.get(&ItemId::from("A")), Some(&3));
        assert_eq!(q.get(&ItemId::from("B")), Some(&1));
    }

    #[test]
    fn issue_below_zero_is_rejected() {
        let home = TempDir::new().unwrap();
        let ledger = Ledger::open_at(home.path()).unwrap();
        ledger.append(receive("A", 2)).unwrap();
        let err = ledger
            .append(TxDraft::new("A", -3, TxKind::Issue, "tester"))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation { .. }));
        // Nothing written, seq unchanged.
        assert_eq!(ledger.last_seq(), 1);
        assert_eq!(ledger.materialize().get(&ItemId::from("A")), Some(&2));
    }

    #[test]
    fn adjust_may_go_negative() {
        let home = TempDir::new().unwrap();
        let ledger = Ledger::open_at(home.path()).unwrap();
        ledger
            .append(TxDraft::new("A", -4, TxKind::Adjust, "auditor"))
            .unwrap();
        assert_eq!(ledger.materialize().get(&ItemId::from("A")), Some(&-4));
    }

    #[test]
    fn wrong_sign_for_kind_is_rejected() {
        let home = TempDir::new().unwrap();
        let ledger = Ledger::open_at(home.path()).unwrap();
        assert!(ledger.append(receive("A", -5)).is_err());
        assert!(ledger
            .append(TxDraft::new("A", 5, TxKind::Issue, "tester"))
            .is_err());
    }

    #[test]
    fn reopen_replays_log() {
        let home = TempDir::new().unwrap();
        {
            let ledger = Ledger::open_at(home.path()).unwrap();
            ledger.append(receive("A", 5)).unwrap();
            ledger.append(receive("B", 7)).unwrap();
        }
        let reopened = Ledger::open_at(home.path()).unwrap();
        assert_eq!(reopened.last_seq(), 2);
        assert_eq!(reopened.materialize().get(&ItemId::from("B")), Some(&7));
        // Appends continue from the replayed seq.
        assert_eq!(reopened.append(receive("C", 1)).unwrap(), 3);
    }

    #[test]
    fn read_since_skips_up_to_checkpoint() {
        let home = TempDir::new().unwrap();
        let ledger = Ledger::open_at(home.path()).unwrap();
        ledger.append(receive("A", 1)).unwrap();
        ledger.append(receive("B", 2)).unwrap();
        ledger.append(receive("C", 3)).unwrap();

        let txs: Vec<_> = ledger
            .read_since(1)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].seq, 2);
        assert_eq!(txs[1].seq, 3);
    }

    #[test]
    fn seq_gap_in_log_is_corruption() {
        let home = TempDir::new().unwrap();
        {
            let ledger = Ledger::open_at(home.path()).unwrap();
            ledger.append(receive("A", 1)).unwrap();
        }
        let log_path = log_path_at(home.path());
        let mut contents = std::fs::read_to_string(&log_path).unwrap();
        // Forge a line with a skipped sequence number.
        contents.push_str(&contents.clone().replace("\"seq\":1", "\"seq\":3"));
        std::fs::write(&log_path, contents).unwrap();

        let err = Ledger::open_at(home.path()).unwrap_err();
        assert!(matches!(err, LedgerError::Corrupt { .. }));
    }

    #[test]
    fn garbage_line_is_corruption() {
        let home = TempDir::new().unwrap();
        let log_path = log_path_at(home.path());
        std::fs::create_dir_all(log_path.parent().unwrap()).unwrap();
        std::fs::write(&log_path, "not json\n").unwrap();
        assert!(matches!(
            Ledger::open_at(home.path()),
            Err(LedgerError::Corrupt { .. })
        ));
    }

    #[test]
    fn first_reference_registers_item_meta() {
        let home = TempDir::new().unwrap();
        let ledger = Ledger::open_at(home.path()).unwrap();
        ledger
            .append(receive("DRILL-9", 1).with_meta("Cordless drill", "pcs"))
            .unwrap();
        // Later metadata does not overwrite the first registration.
        ledger
            .append(receive("DRILL-9", 1).with_meta("Other name", "boxes"))
            .unwrap();

        let items = ledger.items();
        let meta = items.get(&ItemId::from("DRILL-9")).unwrap();
        assert_eq!(meta.name, "Cordless drill");
        assert_eq!(meta.unit, "pcs");
    }

    #[test]
    fn catalog_survives_reopen() {
        let home = TempDir::new().unwrap();
        {
            let ledger = Ledger::open_at(home.path()).unwrap();
            ledger
                .append(receive("X", 1).with_meta("Thing", "m"))
                .unwrap();
        }
        let reopened = Ledger::open_at(home.path()).unwrap();
        assert_eq!(reopened.items().get(&ItemId::from("X")).unwrap().unit, "m");
    }

    #[test]
    fn recent_returns_last_n_in_order() {
        let home = TempDir::new().unwrap();
        let ledger = Ledger::open_at(home.path()).unwrap();
        for i in 1..=5 {
            ledger.append(receive(&format!("I{i}"), i)).unwrap();
        }
        let recent = ledger.recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].seq, 4);
        assert_eq!(recent[1].seq, 5);
    }
}
