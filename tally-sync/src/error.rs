//! Error types for tally-sync.

use std::path::PathBuf;

use thiserror::Error;

use tally_core::LedgerError;
use tally_gateway::GatewayError;

/// All errors that can arise from reconciliation.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The spreadsheet gateway failed; the cycle aborts, checkpoint untouched.
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// A ledger operation failed (compensation append, read).
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error (checkpoint writes).
    #[error("checkpoint JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The persisted checkpoint is unreadable. Unrecoverable on startup;
    /// requires operator intervention.
    #[error("checkpoint corrupt at {path}: {detail}")]
    CheckpointCorrupt { path: PathBuf, detail: String },

    /// A cycle is already in flight; the trigger was coalesced.
    #[error("a reconciliation cycle is already running")]
    Busy,
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
