//! Error types for tally-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{ItemId, TxKind};

/// All errors that can arise from ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Underlying I/O failure, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("ledger JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The transaction was rejected synchronously; the caller must correct
    /// its input. Nothing was written.
    #[error("transaction rejected for '{item}': {reason}")]
    Validation { item: ItemId, reason: String },

    /// The persisted log is unreadable or violates the sequence invariant.
    /// Unrecoverable; startup halts and requires operator intervention.
    #[error("ledger log corrupt at {path}: {detail}")]
    Corrupt { path: PathBuf, detail: String },
}

impl LedgerError {
    pub(crate) fn negative_balance(item: &ItemId, kind: TxKind, resulting: i64) -> Self {
        LedgerError::Validation {
            item: item.clone(),
            reason: format!("{kind} would leave quantity at {resulting}"),
        }
    }

    pub(crate) fn bad_sign(item: &ItemId, kind: TxKind, delta: i64) -> Self {
        LedgerError::Validation {
            item: item.clone(),
            reason: format!("delta {delta} has the wrong sign for {kind}"),
        }
    }
}

/// Convenience constructor for [`LedgerError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> LedgerError {
    LedgerError::Io {
        path: path.into(),
        source,
    }
}

/// Errors from loading the environment configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot determine home directory; set $HOME or TALLY_HOME")]
    HomeNotFound,

    #[error("SHEET_ID is required unless MOCK_SHEETS=true")]
    MissingSheetId,

    #[error("invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
}
