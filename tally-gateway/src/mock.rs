//! In-memory sheet transport.
//!
//! Used when `MOCK_SHEETS=true` and throughout the test suites. Supports
//! failure injection: rate-limit the next N calls, or reject a write at a
//! specific op index mid-batch.

use std::sync::Mutex;

use crate::error::TransportError;
use crate::transport::{OpOutcome, Page, RowOp, SheetRow, SheetTransport, DATA_START_ROW};

#[derive(Debug, Default)]
struct MockState {
    /// Data rows only; element 0 is sheet row [`DATA_START_ROW`].
    rows: Vec<Vec<String>>,
    rate_limited_remaining: u32,
    fail_write_at_op: Option<usize>,
    read_calls: u32,
    write_calls: u32,
}

/// Mutex-backed fake sheet. Cheap to share via `Arc` so tests can keep a
/// handle while the gateway owns another.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    state: Mutex<MockState>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all data rows (external edits in tests go through here too).
    pub fn seed_rows(&self, rows: Vec<Vec<String>>) {
        self.lock().rows = rows;
    }

    /// Overwrite a single data row in place, simulating a manual edit.
    pub fn edit_row(&self, sheet_index: u64, cells: Vec<String>) {
        let mut state = self.lock();
        let slot = (sheet_index - DATA_START_ROW) as usize;
        if slot < state.rows.len() {
            state.rows[slot] = cells;
        }
    }

    /// Delete a data row, shifting the rest up (simulates a row removal).
    pub fn delete_row(&self, sheet_index: u64) {
        let mut state = self.lock();
        let slot = (sheet_index - DATA_START_ROW) as usize;
        if slot < state.rows.len() {
            state.rows.remove(slot);
        }
    }

    /// Snapshot of the current data rows.
    pub fn rows(&self) -> Vec<Vec<String>> {
        self.lock().rows.clone()
    }

    /// The next `n` calls (read or write) fail with `RateLimited`.
    pub fn fail_rate_limited(&self, n: u32) {
        self.lock().rate_limited_remaining = n;
    }

    /// The next write call rejects the op at `op_index`, applying ops
    /// before it and nothing after — a mid-batch failure.
    pub fn fail_write_at(&self, op_index: usize) {
        self.lock().fail_write_at_op = Some(op_index);
    }

    pub fn read_calls(&self) -> u32 {
        self.lock().read_calls
    }

    pub fn write_calls(&self) -> u32 {
        self.lock().write_calls
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn check_rate_limit(state: &mut MockState) -> Result<(), TransportError> {
        if state.rate_limited_remaining > 0 {
            state.rate_limited_remaining -= 1;
            return Err(TransportError::RateLimited);
        }
        Ok(())
    }
}

impl SheetTransport for MemoryTransport {
    fn read_page(&self, offset: u64, limit: u64) -> Result<Page, TransportError> {
        let mut state = self.lock();
        state.read_calls += 1;
        Self::check_rate_limit(&mut state)?;

        let start = offset as usize;
        let end = (start + limit as usize).min(state.rows.len());
        let rows = if start >= state.rows.len() {
            Vec::new()
        } else {
            state.rows[start..end]
                .iter()
                .enumerate()
                .map(|(i, cells)| SheetRow {
                    index: DATA_START_ROW + offset + i as u64,
                    cells: cells.clone(),
                })
                .collect()
        };
        let done = end >= state.rows.len();
        Ok(Page { rows, done })
    }

    fn write(&self, ops: &[RowOp]) -> Result<Vec<OpOutcome>, TransportError> {
        let mut state = self.lock();
        state.write_calls += 1;
        Self::check_rate_limit(&mut state)?;

        let fail_at = state.fail_write_at_op.take();
        let mut outcomes = Vec::with_capacity(ops.len());
        for (i, op) in ops.iter().enumerate() {
            if fail_at == Some(i) {
                return Err(TransportError::Rejected {
                    op_index: i,
                    detail: "injected write failure".to_string(),
                });
            }
            match op {
                RowOp::Update { index, cells } => {
                    let slot = index
                        .checked_sub(DATA_START_ROW)
                        .map(|s| s as usize)
                        .filter(|s| *s < state.rows.len());
                    let Some(slot) = slot else {
                        return Err(TransportError::Rejected {
                            op_index: i,
                            detail: format!("row index {index} out of range"),
                        });
                    };
                    state.rows[slot] = cells.clone();
                    outcomes.push(OpOutcome { index: *index });
                }
                RowOp::Append { cells } => {
                    let index = DATA_START_ROW + state.rows.len() as u64;
                    state.rows.push(cells.clone());
                    outcomes.push(OpOutcome { index });
                }
            }
        }
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn append_assigns_sequential_indices() {
        let t = MemoryTransport::new();
        let out = t
            .write(&[
                RowOp::Append { cells: cells(&["A"]) },
                RowOp::Append { cells: cells(&["B"]) },
            ])
            .unwrap();
        assert_eq!(out[0].index, 2);
        assert_eq!(out[1].index, 3);
    }

    #[test]
    fn update_out_of_range_is_rejected() {
        let t = MemoryTransport::new();
        let err = t
            .write(&[RowOp::Update { index: 9, cells: cells(&["X"]) }])
            .unwrap_err();
        assert!(matches!(err, TransportError::Rejected { op_index: 0, .. }));
    }

    #[test]
    fn mid_batch_failure_keeps_earlier_ops() {
        let t = MemoryTransport::new();
        t.seed_rows(vec![cells(&["old"])]);
        t.fail_write_at(1);
        let err = t
            .write(&[
                RowOp::Update { index: 2, cells: cells(&["new"]) },
                RowOp::Append { cells: cells(&["never"]) },
            ])
            .unwrap_err();
        assert!(matches!(err, TransportError::Rejected { op_index: 1, .. }));
        assert_eq!(t.rows(), vec![cells(&["new"])]);
    }

    #[test]
    fn read_page_paginates_and_reports_done() {
        let t = MemoryTransport::new();
        t.seed_rows(vec![cells(&["r0"]), cells(&["r1"]), cells(&["r2"])]);

        let first = t.read_page(0, 2).unwrap();
        assert_eq!(first.rows.len(), 2);
        assert_eq!(first.rows[0].index, 2);
        assert!(!first.done);

        let second = t.read_page(2, 2).unwrap();
        assert_eq!(second.rows.len(), 1);
        assert_eq!(second.rows[0].index, 4);
        assert!(second.done);
    }

    #[test]
    fn rate_limit_injection_decrements() {
        let t = MemoryTransport::new();
        t.fail_rate_limited(1);
        assert!(matches!(
            t.read_page(0, 10),
            Err(TransportError::RateLimited)
        ));
        assert!(t.read_page(0, 10).is_ok());
    }
}
