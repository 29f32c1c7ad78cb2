//! `tally status` — ledger/sheet freshness visibility.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use tally_core::Ledger;
use tally_sync::{format_datetime_age, report, SheetState};

/// Arguments for `tally status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home = super::resolve_home()?;
        let ledger = Ledger::open_at(&home).context("failed to open ledger")?;
        let report = report::check(&home, &ledger).context("status check failed")?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report)
                    .context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        println!(
            "Tally v{} | {} items | ledger seq {}",
            env!("CARGO_PKG_VERSION"),
            report.items,
            report.ledger_seq,
        );

        let (indicator, label, detail) = match &report.sheet {
            SheetState::NeverSynced => (
                "■".bright_black().bold(),
                "NEVER SYNCED",
                "no sync checkpoint yet".to_string(),
            ),
            SheetState::Pending { ops } => (
                "■".yellow().bold(),
                "PENDING",
                format!("{ops} row(s) waiting for sync"),
            ),
            SheetState::Current => ("■".green().bold(), "CURRENT", "sheet is up to date".to_string()),
        };
        println!("{indicator} {label} — {detail}");

        match report.synced_at {
            Some(at) => println!(
                "  last sync: {} ago (checkpoint seq {})",
                format_datetime_age(at),
                report.checkpoint_seq
            ),
            None => println!("  last sync: never"),
        }

        if !matches!(report.sheet, SheetState::Current) {
            println!("Run 'tally sync' to bring the sheet up to date.");
        }
        Ok(())
    }
}
