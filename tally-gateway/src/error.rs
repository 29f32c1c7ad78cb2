//! Error types for tally-gateway.

use thiserror::Error;

/// Errors produced by a single transport call (one remote API round trip).
#[derive(Debug, Error)]
pub enum TransportError {
    /// The API signalled rate limiting; the gateway retries these.
    #[error("rate limited by the spreadsheet API")]
    RateLimited,

    /// Authentication/authorization failure (expired or invalid token).
    #[error("spreadsheet auth failure: {0}")]
    Auth(String),

    /// The API rejected one operation in the call (e.g. stale row index).
    /// `op_index` is relative to the ops passed to this call.
    #[error("operation {op_index} rejected: {detail}")]
    Rejected { op_index: usize, detail: String },

    /// Any other HTTP-level failure.
    #[error("spreadsheet API error (status {status}): {detail}")]
    Http { status: u16, detail: String },

    /// Network-level failure (DNS, connect, timeout).
    #[error("spreadsheet network error: {0}")]
    Network(String),

    /// The response body could not be interpreted.
    #[error("malformed spreadsheet API response: {0}")]
    BadResponse(String),
}

/// Errors surfaced by the gateway to the sync engine.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Retries exhausted or persistent network/auth failure. The current
    /// reconciliation cycle must abort without committing a checkpoint.
    #[error("spreadsheet gateway unavailable after {attempts} attempt(s): {last}")]
    Unavailable { attempts: u32, last: String },

    /// A specific row operation was rejected mid-batch. `index` is the
    /// position in the caller-provided operation list.
    #[error("batch operation {index} failed: {detail}")]
    Operation { index: usize, detail: String },

    /// The in-flight cycle was cancelled between remote calls.
    #[error("gateway call cancelled")]
    Cancelled,
}
