//! Transport seam between the gateway and the real spreadsheet API.
//!
//! A transport performs exactly one remote call per method; pagination,
//! batching, ordering, and retries all live in the gateway so transports
//! stay trivially small (and the in-memory one stays honest).

use std::sync::Arc;

use crate::error::TransportError;

/// First sheet row that carries data; row 1 is the human-readable header.
pub const DATA_START_ROW: u64 = 2;

/// One spreadsheet row as fetched. `index` is the absolute 1-based sheet
/// row number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRow {
    pub index: u64,
    pub cells: Vec<String>,
}

/// A single row mutation. Ordering of a slice of ops is significant and
/// must never be changed by a transport or the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOp {
    /// Overwrite the cells of an existing row at an absolute index.
    Update { index: u64, cells: Vec<String> },
    /// Add a row after the last occupied row.
    Append { cells: Vec<String> },
}

impl RowOp {
    pub fn cells(&self) -> &[String] {
        match self {
            RowOp::Update { cells, .. } | RowOp::Append { cells } => cells,
        }
    }
}

/// Result of one applied operation: the absolute row index written (for
/// appends, the index the API assigned).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpOutcome {
    pub index: u64,
}

/// A page of fetched rows. `done` is set when the transport knows there is
/// nothing past this page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub rows: Vec<SheetRow>,
    pub done: bool,
}

/// One-call-per-method access to the external spreadsheet document.
pub trait SheetTransport: Send + Sync {
    /// Read up to `limit` data rows starting `offset` rows past
    /// [`DATA_START_ROW`].
    fn read_page(&self, offset: u64, limit: u64) -> Result<Page, TransportError>;

    /// Apply `ops` in order within one remote call. Returns one outcome
    /// per op, in op order. Must not apply anything past a rejected op.
    fn write(&self, ops: &[RowOp]) -> Result<Vec<OpOutcome>, TransportError>;
}

impl<T: SheetTransport + ?Sized> SheetTransport for Arc<T> {
    fn read_page(&self, offset: u64, limit: u64) -> Result<Page, TransportError> {
        (**self).read_page(offset, limit)
    }

    fn write(&self, ops: &[RowOp]) -> Result<Vec<OpOutcome>, TransportError> {
        (**self).write(ops)
    }
}
