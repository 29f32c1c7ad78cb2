//! The spreadsheet gateway: pagination, bounded ordered batches, retry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::backoff::Backoff;
use crate::error::{GatewayError, TransportError};
use crate::transport::{OpOutcome, RowOp, SheetRow, SheetTransport};

/// Cooperative cancellation flag, checked before every remote call.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Re-arm the token for a fresh cycle.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Tunables for the external API's hard limits.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Rows fetched per `values.get` call.
    pub page_size: u64,
    /// Maximum operations the API accepts per write call.
    pub max_ops_per_call: usize,
    /// Attempts per remote call before giving up (`Unavailable`).
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            page_size: 500,
            max_ops_per_call: 50,
            max_attempts: 5,
            backoff: Backoff::default(),
        }
    }
}

/// Retrying, batching facade over a [`SheetTransport`].
///
/// Never reorders operations: chunks are consecutive slices of the
/// caller's list, applied in order, so update-then-append sequences that
/// reference row indices stay valid.
pub struct SheetGateway<T: SheetTransport> {
    transport: T,
    config: GatewayConfig,
    cancel: CancelToken,
}

impl<T: SheetTransport> SheetGateway<T> {
    pub fn new(transport: T, config: GatewayConfig) -> Self {
        Self {
            transport,
            config,
            cancel: CancelToken::new(),
        }
    }

    /// Token shared with the sync engine for cooperative cancellation.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Fetch every data row, fully draining pagination before returning.
    pub fn fetch_rows(&self) -> Result<Vec<SheetRow>, GatewayError> {
        let mut rows = Vec::new();
        let mut offset = 0u64;
        loop {
            let page = self.call_with_retry(|| {
                self.transport.read_page(offset, self.config.page_size)
            })?;
            offset += page.rows.len() as u64;
            let done = page.done || page.rows.is_empty();
            rows.extend(page.rows);
            if done {
                return Ok(rows);
            }
        }
    }

    /// Apply `ops` in caller order, split into bounded chunks. Returns one
    /// outcome per op. Any failure leaves later ops unapplied; the caller
    /// must treat the whole batch as failed and not commit.
    pub fn apply_batch(&self, ops: &[RowOp]) -> Result<Vec<OpOutcome>, GatewayError> {
        let mut outcomes = Vec::with_capacity(ops.len());
        for (chunk_start, chunk) in ops
            .chunks(self.config.max_ops_per_call)
            .scan(0usize, |start, chunk| {
                let s = *start;
                *start += chunk.len();
                Some((s, chunk))
            })
        {
            let result = self.call_with_retry(|| self.transport.write(chunk));
            match result {
                Ok(chunk_outcomes) => outcomes.extend(chunk_outcomes),
                Err(GatewayError::Unavailable { attempts, last }) => {
                    return Err(GatewayError::Unavailable { attempts, last })
                }
                Err(other) => return Err(globalize_op_index(other, chunk_start)),
            }
        }
        Ok(outcomes)
    }

    fn call_with_retry<R>(
        &self,
        mut call: impl FnMut() -> Result<R, TransportError>,
    ) -> Result<R, GatewayError> {
        let mut last = String::new();
        for attempt in 0..self.config.max_attempts {
            if self.cancel.is_cancelled() {
                return Err(GatewayError::Cancelled);
            }
            match call() {
                Ok(value) => return Ok(value),
                Err(TransportError::RateLimited) => {
                    last = TransportError::RateLimited.to_string();
                    let delay = self.config.backoff.delay(attempt);
                    tracing::warn!(
                        "rate limited, retrying in {delay:?} (attempt {}/{})",
                        attempt + 1,
                        self.config.max_attempts
                    );
                    std::thread::sleep(delay);
                }
                Err(TransportError::Rejected { op_index, detail }) => {
                    return Err(GatewayError::Operation {
                        index: op_index,
                        detail,
                    })
                }
                // Auth, HTTP and network failures are not retried per-call;
                // the cycle aborts and the next one starts from scratch.
                Err(other) => {
                    return Err(GatewayError::Unavailable {
                        attempts: attempt + 1,
                        last: other.to_string(),
                    })
                }
            }
        }
        Err(GatewayError::Unavailable {
            attempts: self.config.max_attempts,
            last,
        })
    }
}

fn globalize_op_index(err: GatewayError, chunk_start: usize) -> GatewayError {
    match err {
        GatewayError::Operation { index, detail } => GatewayError::Operation {
            index: chunk_start + index,
            detail,
        },
        other => other,
    }
}
