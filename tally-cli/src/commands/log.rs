//! `tally log` — recent ledger transactions.

use anyhow::{Context, Result};
use clap::Args;
use tabled::{settings::Style, Table, Tabled};

use tally_core::{Ledger, Transaction};

/// Arguments for `tally log`.
#[derive(Args, Debug)]
pub struct LogArgs {
    /// Maximum number of transactions to show (newest first).
    #[arg(long, short = 'n', default_value_t = 20)]
    pub limit: usize,

    /// Filter to a single item.
    #[arg(long)]
    pub item: Option<String>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct LogTableRow {
    #[tabled(rename = "seq")]
    seq: u64,
    #[tabled(rename = "when")]
    when: String,
    #[tabled(rename = "kind")]
    kind: String,
    #[tabled(rename = "item")]
    item: String,
    #[tabled(rename = "delta")]
    delta: String,
    #[tabled(rename = "actor")]
    actor: String,
    #[tabled(rename = "note")]
    note: String,
}

impl LogArgs {
    pub fn run(self) -> Result<()> {
        let home = super::resolve_home()?;
        let ledger = Ledger::open_at(&home).context("failed to open ledger")?;

        let mut txs: Vec<Transaction> = if let Some(item) = self.item.as_deref() {
            let all: Vec<Transaction> = ledger
                .read_since(0)
                .context("failed to read ledger")?
                .collect::<Result<_, _>>()
                .context("failed to read ledger")?;
            all.into_iter()
                .filter(|tx| tx.item.0 == item)
                .rev()
                .take(self.limit)
                .collect()
        } else {
            ledger.recent(self.limit).context("failed to read ledger")?
        };
        txs.sort_by(|a, b| b.seq.cmp(&a.seq));

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&txs).context("failed to serialize log JSON")?
            );
            return Ok(());
        }

        if txs.is_empty() {
            println!("No transactions recorded.");
            return Ok(());
        }

        let rows: Vec<LogTableRow> = txs
            .into_iter()
            .map(|tx| LogTableRow {
                seq: tx.seq,
                when: tx.timestamp.format("%Y-%m-%d %H:%M").to_string(),
                kind: tx.kind.to_string(),
                item: tx.item.0,
                delta: format!("{:+}", tx.delta),
                actor: tx.actor.0,
                note: tx.note.unwrap_or_default(),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}
