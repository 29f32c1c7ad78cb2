//! # tally-gateway
//!
//! Access to the external spreadsheet: a one-call-per-method
//! [`SheetTransport`] seam (HTTP and in-memory implementations) wrapped by
//! [`SheetGateway`], which owns pagination, bounded ordered batching, and
//! rate-limit retry with exponential backoff.

pub mod backoff;
pub mod error;
pub mod gateway;
pub mod http;
pub mod mock;
pub mod transport;

pub use backoff::Backoff;
pub use error::{GatewayError, TransportError};
pub use gateway::{CancelToken, GatewayConfig, SheetGateway};
pub use http::{HttpTransport, StaticToken, TokenProvider};
pub use mock::MemoryTransport;
pub use transport::{OpOutcome, Page, RowOp, SheetRow, SheetTransport, DATA_START_ROW};
