//! `tally sync` — reconcile the ledger with the external sheet.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use tally_core::{Config, Ledger};
use tally_sync::{diff_sheet, CycleOutcome, PlannedWrite, SyncEngine};

/// Arguments for `tally sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Plan and resolve, but write nothing to the sheet or checkpoint.
    #[arg(long)]
    pub dry_run: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let config = Config::from_env().context("invalid configuration")?;
        let ledger =
            Arc::new(Ledger::open_at(&config.home).context("failed to open ledger")?);
        let engine = SyncEngine::from_config(&config, Arc::clone(&ledger));

        let outcome = engine.run_cycle(self.dry_run).context("sync failed")?;
        if self.dry_run {
            let diff = diff_sheet(&config.home, &ledger).context("diff failed")?;
            if !diff.is_empty() {
                print!("{}", diff.unified_diff);
            }
        }
        print_outcome(&outcome);
        Ok(())
    }
}

fn print_outcome(outcome: &CycleOutcome) {
    let prefix = if outcome.dry_run { "[dry-run] " } else { "" };

    if outcome.writes.is_empty() && outcome.conflicts.is_empty() {
        println!("{prefix}✓ Sheet already current");
        return;
    }

    for write in &outcome.writes {
        println!("  {}  {}", write_marker(write), describe_write(write));
    }
    for conflict in &outcome.conflicts {
        let sheet_qty = conflict
            .external_qty
            .map(|q| q.to_string())
            .unwrap_or_else(|| "?".to_string());
        println!(
            "  {}  '{}' {} (sheet {sheet_qty}, ledger {})",
            "!".yellow(),
            conflict.item,
            conflict.outcome,
            conflict.engine_qty,
        );
    }

    if outcome.dry_run {
        println!(
            "{prefix}{} row(s) would be written",
            outcome.writes.len()
        );
    } else {
        println!(
            "✓ Synced: {} row(s) written, {} conflict(s) resolved",
            outcome.applied,
            outcome.conflicts.len()
        );
    }
}

fn write_marker(write: &PlannedWrite) -> String {
    if write.is_update() {
        "~".to_string()
    } else {
        "+".green().to_string()
    }
}

fn describe_write(write: &PlannedWrite) -> String {
    let verb = if write.is_update() { "update" } else { "append" };
    format!("{verb} '{}' qty {} (seq {})", write.item, write.qty, write.seq)
}
