//! `tally init` — create the ledger storage tree.

use anyhow::{Context, Result};
use clap::Args;

use tally_core::ledger::{self, Ledger};

/// Initialize the ledger under the tally home directory.
#[derive(Args, Debug)]
pub struct InitArgs {}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let home = super::resolve_home()?;
        let ledger = Ledger::open_at(&home).context("failed to create ledger storage")?;
        let seq = ledger.last_seq();

        println!("✓ Ledger ready at {}", ledger::ledger_dir_at(&home).display());
        println!("  log:     {}", ledger::log_path_at(&home).display());
        println!("  catalog: {}", ledger::catalog_path_at(&home).display());
        if seq > 0 {
            println!("  {seq} existing transactions");
        }
        Ok(())
    }
}
