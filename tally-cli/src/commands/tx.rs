//! `tally receive|issue|move|adjust` — append a transaction to the ledger.

use anyhow::{Context, Result};
use clap::Args;

use tally_core::{ItemId, Ledger, TxDraft, TxKind};

/// Arguments for `tally receive` and `tally issue`: the quantity is given
/// as a positive count and the command supplies the sign.
#[derive(Args, Debug)]
pub struct TxArgs {
    /// Item identifier (SKU or decoded QR payload).
    pub item: String,

    /// Quantity, as a positive count.
    pub qty: i64,

    /// Display name to register the item under (first reference only).
    #[arg(long)]
    pub name: Option<String>,

    /// Unit of measure (first reference only, defaults to "pcs").
    #[arg(long)]
    pub unit: Option<String>,

    /// Free-form note attached to the transaction.
    #[arg(long)]
    pub note: Option<String>,

    /// Who performed the transaction. Defaults to $USER.
    #[arg(long)]
    pub actor: Option<String>,
}

impl TxArgs {
    pub fn run(self, kind: TxKind) -> Result<()> {
        anyhow::ensure!(self.qty > 0, "quantity must be positive (got {})", self.qty);
        let delta = match kind {
            TxKind::Issue => -self.qty,
            _ => self.qty,
        };
        append(
            self.item, delta, kind, self.name, self.unit, self.note, self.actor,
        )
    }
}

/// Arguments for `tally move` and `tally adjust`: the delta is taken as
/// given, sign included.
#[derive(Args, Debug)]
pub struct SignedTxArgs {
    /// Item identifier (SKU or decoded QR payload).
    pub item: String,

    /// Signed quantity change.
    #[arg(allow_hyphen_values = true)]
    pub delta: i64,

    /// Free-form note attached to the transaction.
    #[arg(long)]
    pub note: Option<String>,

    /// Who performed the transaction. Defaults to $USER.
    #[arg(long)]
    pub actor: Option<String>,
}

impl SignedTxArgs {
    pub fn run(self, kind: TxKind) -> Result<()> {
        append(self.item, self.delta, kind, None, None, self.note, self.actor)
    }
}

fn append(
    item: String,
    delta: i64,
    kind: TxKind,
    name: Option<String>,
    unit: Option<String>,
    note: Option<String>,
    actor: Option<String>,
) -> Result<()> {
    let home = super::resolve_home()?;
    let ledger = Ledger::open_at(&home).context("failed to open ledger")?;

    let actor = actor
        .or_else(|| std::env::var("USER").ok().filter(|u| !u.is_empty()))
        .unwrap_or_else(|| "cli".to_string());

    let mut draft = TxDraft::new(item.clone(), delta, kind, actor);
    if name.is_some() || unit.is_some() {
        draft = draft.with_meta(
            name.unwrap_or_else(|| item.clone()),
            unit.unwrap_or_else(|| "pcs".to_string()),
        );
    }
    if let Some(note) = note {
        draft = draft.with_note(note);
    }

    let seq = ledger.append(draft)?;
    let balances = ledger.materialize();
    let qty = balances.get(&ItemId::from(item.as_str())).copied().unwrap_or(0);

    println!("✓ [{seq}] {kind} {delta:+} '{item}' (now {qty})");
    Ok(())
}
