//! Google Sheets values-API transport over blocking HTTP.
//!
//! Only the two calls the gateway needs are implemented: `values.get`
//! for page reads, and `values.batchUpdate` / `values.append` for writes.
//! Rows span columns A..E (`[item_id, name, qty, unit, seq]`).

use std::time::Duration;

use serde_json::{json, Value};

use crate::error::TransportError;
use crate::transport::{OpOutcome, Page, RowOp, SheetRow, SheetTransport, DATA_START_ROW};

const LAST_COLUMN: char = 'E';

/// Supplies a bearer token per call. Refresh logic (service-account JWT
/// exchange, cached expiry) lives behind this trait and is opaque to the
/// rest of the engine.
pub trait TokenProvider: Send + Sync {
    fn token(&self) -> Result<String, TransportError>;
}

/// A fixed, pre-issued access token.
pub struct StaticToken(pub String);

impl TokenProvider for StaticToken {
    fn token(&self) -> Result<String, TransportError> {
        Ok(self.0.clone())
    }
}

/// Blocking transport against the Sheets REST API.
pub struct HttpTransport {
    agent: ureq::Agent,
    base_url: String,
    spreadsheet_id: String,
    sheet_name: String,
    tokens: Box<dyn TokenProvider>,
}

impl HttpTransport {
    pub fn new(
        spreadsheet_id: impl Into<String>,
        sheet_name: impl Into<String>,
        tokens: Box<dyn TokenProvider>,
    ) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(30))
                .build(),
            base_url: "https://sheets.googleapis.com".to_string(),
            spreadsheet_id: spreadsheet_id.into(),
            sheet_name: sheet_name.into(),
            tokens,
        }
    }

    /// Point the transport at a different API host (tests, corporate proxy).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn values_url(&self, suffix: &str) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values{}",
            self.base_url, self.spreadsheet_id, suffix
        )
    }

    fn bearer(&self) -> Result<String, TransportError> {
        Ok(format!("Bearer {}", self.tokens.token()?))
    }

    fn do_updates(&self, updates: &[(u64, &[String])]) -> Result<(), TransportError> {
        if updates.is_empty() {
            return Ok(());
        }
        let data: Vec<Value> = updates
            .iter()
            .map(|(index, cells)| {
                json!({
                    "range": format!("{}!A{}", self.sheet_name, index),
                    "values": [cells],
                })
            })
            .collect();
        let body = json!({ "valueInputOption": "RAW", "data": data });
        let url = self.values_url(":batchUpdate");
        self.agent
            .post(&url)
            .set("Authorization", &self.bearer()?)
            .send_json(body)
            .map_err(map_write_error)?;
        Ok(())
    }

    fn do_appends(&self, rows: &[&[String]]) -> Result<Vec<u64>, TransportError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!(
            "{}?valueInputOption=RAW&insertDataOption=INSERT_ROWS",
            self.values_url(&format!(
                "/{}!A{}:{}:append",
                self.sheet_name, DATA_START_ROW, LAST_COLUMN
            ))
        );
        let values: Vec<&[String]> = rows.to_vec();
        let response = self
            .agent
            .post(&url)
            .set("Authorization", &self.bearer()?)
            .send_json(json!({ "values": values }))
            .map_err(map_write_error)?;

        let body: Value = response
            .into_json()
            .map_err(|e| TransportError::BadResponse(e.to_string()))?;
        let range = body
            .pointer("/updates/updatedRange")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                TransportError::BadResponse("append response missing updatedRange".to_string())
            })?;
        let start = parse_range_start(range).ok_or_else(|| {
            TransportError::BadResponse(format!("unparsable updatedRange '{range}'"))
        })?;
        Ok((0..rows.len() as u64).map(|i| start + i).collect())
    }
}

impl SheetTransport for HttpTransport {
    fn read_page(&self, offset: u64, limit: u64) -> Result<Page, TransportError> {
        let start = DATA_START_ROW + offset;
        let end = start + limit - 1;
        let url = format!(
            "{}?majorDimension=ROWS",
            self.values_url(&format!(
                "/{}!A{start}:{LAST_COLUMN}{end}",
                self.sheet_name
            ))
        );
        let response = self
            .agent
            .get(&url)
            .set("Authorization", &self.bearer()?)
            .call()
            .map_err(map_error)?;

        let body: Value = response
            .into_json()
            .map_err(|e| TransportError::BadResponse(e.to_string()))?;
        let values = body
            .get("values")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let rows: Vec<SheetRow> = values
            .iter()
            .enumerate()
            .map(|(i, row)| SheetRow {
                index: start + i as u64,
                cells: row
                    .as_array()
                    .map(|cells| {
                        cells
                            .iter()
                            .map(|c| c.as_str().map(str::to_owned).unwrap_or_else(|| c.to_string()))
                            .collect()
                    })
                    .unwrap_or_default(),
            })
            .collect();
        let done = (rows.len() as u64) < limit;
        Ok(Page { rows, done })
    }

    /// Requires the caller-preserved updates-before-appends order the
    /// planner produces; updates go through `values.batchUpdate`, appends
    /// through `values.append`, outcomes are reassembled in op order.
    fn write(&self, ops: &[RowOp]) -> Result<Vec<OpOutcome>, TransportError> {
        let mut updates: Vec<(u64, &[String])> = Vec::new();
        let mut appends: Vec<&[String]> = Vec::new();
        for op in ops {
            match op {
                RowOp::Update { index, cells } => updates.push((*index, cells)),
                RowOp::Append { cells } => appends.push(cells),
            }
        }

        self.do_updates(&updates)?;
        let appended = self.do_appends(&appends)?;

        let mut appended_iter = appended.into_iter();
        let mut outcomes = Vec::with_capacity(ops.len());
        for op in ops {
            match op {
                RowOp::Update { index, .. } => outcomes.push(OpOutcome { index: *index }),
                RowOp::Append { .. } => {
                    let index = appended_iter.next().ok_or_else(|| {
                        TransportError::BadResponse(
                            "append outcome count mismatch".to_string(),
                        )
                    })?;
                    outcomes.push(OpOutcome { index });
                }
            }
        }
        Ok(outcomes)
    }
}

fn map_write_error(err: ureq::Error) -> TransportError {
    match err {
        // The values API rejects a bad range/op with a wholesale 400; the
        // gateway surfaces it as a failed batch operation.
        ureq::Error::Status(400, response) => TransportError::Rejected {
            op_index: 0,
            detail: response.into_string().unwrap_or_default(),
        },
        other => map_error(other),
    }
}

fn map_error(err: ureq::Error) -> TransportError {
    match err {
        ureq::Error::Status(429, _) => TransportError::RateLimited,
        ureq::Error::Status(status @ (401 | 403), response) => TransportError::Auth(format!(
            "status {status}: {}",
            response.into_string().unwrap_or_default()
        )),
        ureq::Error::Status(status, response) => TransportError::Http {
            status,
            detail: response.into_string().unwrap_or_default(),
        },
        ureq::Error::Transport(t) => TransportError::Network(t.to_string()),
    }
}

/// Extract the starting row number from a range like `Stock!A7:E9`.
fn parse_range_start(range: &str) -> Option<u64> {
    let after_bang = range.rsplit('!').next()?;
    let digits: String = after_bang
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
