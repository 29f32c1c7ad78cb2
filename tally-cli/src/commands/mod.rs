//! Subcommand implementations for the `tally` binary.

use std::path::PathBuf;

use anyhow::{Context, Result};

pub mod daemon;
pub mod diff;
pub mod init;
pub mod log;
pub mod status;
pub mod stock;
pub mod sync;
pub mod tx;

/// Resolve the directory that holds `.tally/`. `TALLY_HOME` wins so tests
/// and daemons can point at an isolated tree; otherwise the user's home.
pub fn resolve_home() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("TALLY_HOME") {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    dirs::home_dir().context("could not determine home directory")
}
