//! Tally core library — domain types, ledger persistence, configuration.
//!
//! Public API surface:
//! - [`types`] — newtypes and domain structs
//! - [`error`] — [`LedgerError`], [`ConfigError`]
//! - [`ledger`] — the append-only transaction [`Ledger`]
//! - [`config`] — environment configuration

pub mod config;
pub mod error;
pub mod ledger;
pub mod types;

pub use config::Config;
pub use error::{ConfigError, LedgerError};
pub use ledger::Ledger;
pub use types::{Actor, ItemId, ItemMeta, Transaction, TxDraft, TxKind};
