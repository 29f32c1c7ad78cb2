//! `tally stock` — current quantities per item.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use tally_core::{ItemId, ItemMeta, Ledger};

/// Arguments for `tally stock`.
#[derive(Args, Debug)]
pub struct StockArgs {
    /// Show a single item instead of the whole catalog.
    pub item: Option<String>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct StockJsonRow {
    item: String,
    name: String,
    qty: i64,
    unit: String,
}

#[derive(Tabled)]
struct StockTableRow {
    #[tabled(rename = "item")]
    item: String,
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "qty")]
    qty: i64,
    #[tabled(rename = "unit")]
    unit: String,
}

impl StockArgs {
    pub fn run(self) -> Result<()> {
        let home = super::resolve_home()?;
        let ledger = Ledger::open_at(&home).context("failed to open ledger")?;
        let balances = ledger.materialize();
        let items = ledger.items();

        let mut rows: Vec<(ItemId, ItemMeta, i64)> = Vec::new();
        for (id, qty) in balances {
            if let Some(filter) = self.item.as_deref() {
                if id.0 != filter {
                    continue;
                }
            }
            let meta = items
                .get(&id)
                .cloned()
                .unwrap_or_else(|| ItemMeta::fallback(&id));
            rows.push((id, meta, qty));
        }

        if let Some(filter) = self.item.as_deref() {
            anyhow::ensure!(!rows.is_empty(), "no transactions recorded for '{filter}'");
        }

        if self.json {
            let payload: Vec<StockJsonRow> = rows
                .into_iter()
                .map(|(id, meta, qty)| StockJsonRow {
                    item: id.0,
                    name: meta.name,
                    qty,
                    unit: meta.unit,
                })
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize stock JSON")?
            );
            return Ok(());
        }

        if rows.is_empty() {
            println!("No items recorded. Run `tally receive` first.");
            return Ok(());
        }

        let negatives = rows.iter().filter(|(_, _, qty)| *qty < 0).count();
        let table_rows: Vec<StockTableRow> = rows
            .into_iter()
            .map(|(id, meta, qty)| StockTableRow {
                item: id.0,
                name: meta.name,
                qty,
                unit: meta.unit,
            })
            .collect();
        let mut table = Table::new(table_rows);
        table.with(Style::rounded());
        println!("{table}");
        if negatives > 0 {
            println!(
                "{}",
                format!("{negatives} item(s) below zero — check recent adjustments").yellow()
            );
        }
        Ok(())
    }
}
