//! Domain types for the Tally ledger.
//!
//! All types are serializable/deserializable via serde + serde_json; they
//! appear verbatim in the persisted transaction log, so field changes are
//! format changes.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Canonical identifier for a material item (decoded QR payload or SKU).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub String);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Who performed a transaction (chat handle, operator login, "system").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor(pub String);

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Actor {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Actor {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Kind of a ledger transaction. Closed set; each kind carries its own
/// validation rules (see [`TxKind::validate_delta`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    /// Stock arriving at the warehouse. Delta must be positive.
    Receive,
    /// Stock handed out. Delta must be negative.
    Issue,
    /// Stock moved between holders/locations. Any sign.
    Move,
    /// Manual correction. Any sign, and the only kind allowed to drive a
    /// quantity below zero.
    Adjust,
}

impl TxKind {
    /// `Adjust` is the explicit escape hatch from the non-negative
    /// quantity invariant; every other kind is checked.
    pub fn bypasses_balance_check(self) -> bool {
        matches!(self, TxKind::Adjust)
    }

    /// Sign discipline per kind, checked before a draft is accepted.
    pub fn validate_delta(self, delta: i64) -> bool {
        match self {
            TxKind::Receive => delta > 0,
            TxKind::Issue => delta < 0,
            TxKind::Move | TxKind::Adjust => true,
        }
    }
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxKind::Receive => write!(f, "receive"),
            TxKind::Issue => write!(f, "issue"),
            TxKind::Move => write!(f, "move"),
            TxKind::Adjust => write!(f, "adjust"),
        }
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// One immutable ledger record. `seq` is assigned by the ledger store,
/// strictly increasing and gap-free; once written a transaction is never
/// mutated or reordered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub seq: u64,
    pub item: ItemId,
    pub delta: i64,
    pub kind: TxKind,
    pub timestamp: DateTime<Utc>,
    pub actor: Actor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// A transaction as submitted by a caller, before the ledger assigns
/// `seq` and `timestamp`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxDraft {
    pub item: ItemId,
    pub delta: i64,
    pub kind: TxKind,
    pub actor: Actor,
    pub note: Option<String>,
    /// Display name used to register the item on first reference.
    pub display_name: Option<String>,
    /// Unit of measure used to register the item on first reference.
    pub unit: Option<String>,
}

impl TxDraft {
    pub fn new(item: impl Into<ItemId>, delta: i64, kind: TxKind, actor: impl Into<Actor>) -> Self {
        Self {
            item: item.into(),
            delta,
            kind,
            actor: actor.into(),
            note: None,
            display_name: None,
            unit: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_meta(mut self, name: impl Into<String>, unit: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self.unit = Some(unit.into());
        self
    }
}

/// Catalog entry for an item. Items are created on the first transaction
/// that references them and never deleted, only zeroed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMeta {
    pub name: String,
    pub unit: String,
}

impl ItemMeta {
    /// Defaults when a draft carries no metadata: the id doubles as the
    /// display name, unit is pieces.
    pub fn fallback(id: &ItemId) -> Self {
        Self {
            name: id.0.clone(),
            unit: "pcs".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
