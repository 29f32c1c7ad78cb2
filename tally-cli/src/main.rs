//! Tally — warehouse inventory ledger CLI.
//!
//! # Usage
//!
//! ```text
//! tally init
//! tally receive <item> <qty> [--name <n>] [--unit <u>] [--note <text>]
//! tally issue <item> <qty> [--note <text>]
//! tally move <item> <delta> [--note <text>]
//! tally adjust <item> <delta> [--note <text>]
//! tally stock [<item>] [--json]
//! tally log [--limit <n>] [--item <id>] [--json]
//! tally sync [--dry-run]
//! tally status [--json]
//! tally diff
//! tally daemon start|stop|status|logs
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    daemon::DaemonCommand, diff::DiffArgs, init::InitArgs, log::LogArgs, status::StatusArgs,
    stock::StockArgs, sync::SyncArgs, tx::{SignedTxArgs, TxArgs},
};
use tally_core::TxKind;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "tally",
    version,
    about = "Append-only inventory ledger with spreadsheet sync",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the ledger storage under the tally home directory.
    Init(InitArgs),

    /// Record incoming stock (positive quantity).
    Receive(TxArgs),

    /// Record outgoing stock (positive quantity, subtracted).
    Issue(TxArgs),

    /// Record a relocation or handover (signed delta).
    Move(SignedTxArgs),

    /// Record a manual correction (signed delta, may go below zero).
    Adjust(SignedTxArgs),

    /// Show current quantities.
    Stock(StockArgs),

    /// Show recent ledger transactions.
    Log(LogArgs),

    /// Reconcile the ledger with the external sheet.
    Sync(SyncArgs),

    /// Show ledger/sheet freshness.
    Status(StatusArgs),

    /// Show what sync would change on the sheet.
    Diff(DiffArgs),

    /// Manage the background sync daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Receive(args) => args.run(TxKind::Receive),
        Commands::Issue(args) => args.run(TxKind::Issue),
        Commands::Move(args) => args.run(TxKind::Move),
        Commands::Adjust(args) => args.run(TxKind::Adjust),
        Commands::Stock(args) => args.run(),
        Commands::Log(args) => args.run(),
        Commands::Sync(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Diff(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}
