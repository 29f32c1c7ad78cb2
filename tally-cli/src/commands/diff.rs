//! `tally diff` — preview what sync would change on the sheet.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use tally_core::Ledger;
use tally_sync::diff_sheet;

/// Arguments for `tally diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {}

impl DiffArgs {
    pub fn run(self) -> Result<()> {
        let home = super::resolve_home()?;
        let ledger = Ledger::open_at(&home).context("failed to open ledger")?;
        let diff = diff_sheet(&home, &ledger).context("diff failed")?;

        if diff.is_empty() {
            println!("No differences.");
            return Ok(());
        }

        for line in diff.unified_diff.lines() {
            if line.starts_with('+') && !line.starts_with("+++") {
                println!("{}", line.green());
            } else if line.starts_with('-') && !line.starts_with("---") {
                println!("{}", line.red());
            } else {
                println!("{line}");
            }
        }
        Ok(())
    }
}
