//! Environment-driven configuration.
//!
//! Variables (all optional unless noted):
//!
//! ```text
//! TALLY_HOME          base directory, default ~
//! SHEET_ID            spreadsheet document id (required without MOCK_SHEETS)
//! SHEET_NAME          tab name, default "Stock"
//! SHEET_TOKEN         bearer token for the sheets API
//! MOCK_SHEETS         "true" to use the in-memory sheet transport
//! SYNC_INTERVAL_SECS  daemon reconciliation period, default 300
//! LOG_LEVEL           daemon log filter, default "info"
//! ```
//!
//! A `.env` file in the working directory is honoured via dotenvy.

use std::env;
use std::path::PathBuf;

use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct Config {
    pub home: PathBuf,
    pub sheet_id: String,
    pub sheet_name: String,
    pub sheet_token: Option<String>,
    pub mock_sheets: bool,
    pub sync_interval_secs: u64,
    pub log_level: String,
}

impl Config {
    /// Load configuration from the environment (and `.env`, if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let home = match env::var("TALLY_HOME") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => dirs::home_dir().ok_or(ConfigError::HomeNotFound)?,
        };

        let mock_sheets = env_flag("MOCK_SHEETS");

        let sheet_id = env::var("SHEET_ID").unwrap_or_default();
        if sheet_id.is_empty() && !mock_sheets {
            return Err(ConfigError::MissingSheetId);
        }

        let sheet_name = env::var("SHEET_NAME").unwrap_or_else(|_| "Stock".to_string());
        let sheet_token = env::var("SHEET_TOKEN").ok().filter(|t| !t.is_empty());

        let sync_interval_secs = match env::var("SYNC_INTERVAL_SECS") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                var: "SYNC_INTERVAL_SECS",
                value: raw.clone(),
            })?,
            Err(_) => 300,
        };

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            home,
            sheet_id,
            sheet_name,
            sheet_token,
            mock_sheets,
            sync_interval_secs,
            log_level,
        })
    }
}

fn env_flag(var: &str) -> bool {
    env::var(var)
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false)
}
