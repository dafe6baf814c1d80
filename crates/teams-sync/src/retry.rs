//! Bounded immediate retry for transient upstream failures.

use std::future::Future;

use reqwest::StatusCode;
use rollcall_core::error::{Result, RollcallError};
use tracing::warn;

/// Anything carrying an HTTP status that a retry decision can be made on.
pub trait HasStatus {
    fn status(&self) -> StatusCode;
}

impl HasStatus for reqwest::Response {
    fn status(&self) -> StatusCode {
        reqwest::Response::status(self)
    }
}

/// Graph answers 502 while its backend is briefly unavailable.
pub fn is_bad_gateway(status: StatusCode) -> bool {
    status == StatusCode::BAD_GATEWAY
}

/// Retries a request while the classifier marks its status as transient.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_retries: u32,
    is_transient: fn(StatusCode) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(10)
    }
}

impl RetryPolicy {
    /// Retry 502 responses up to `max_retries` times.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            is_transient: is_bad_gateway,
        }
    }

    /// Replace the transient-status classifier.
    pub fn with_classifier(mut self, is_transient: fn(StatusCode) -> bool) -> Self {
        self.is_transient = is_transient;
        self
    }

    /// Run `send` until it yields a non-transient status.
    ///
    /// Retries are immediate. Transport errors from `send` are returned as-is;
    /// a status still transient after `max_retries` retries is
    /// [`RollcallError::RetriesExhausted`].
    pub async fn run<R, F, Fut>(&self, operation: &str, mut send: F) -> Result<R>
    where
        R: HasStatus,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let mut retries = 0;
        loop {
            let resp = send().await?;
            let status = resp.status();
            if !(self.is_transient)(status) {
                return Ok(resp);
            }
            if retries >= self.max_retries {
                return Err(RollcallError::RetriesExhausted {
                    operation: operation.to_string(),
                    retries,
                    status: status.as_u16(),
                });
            }
            retries += 1;
            warn!(
                operation,
                %status,
                retry = retries,
                max_retries = self.max_retries,
                "transient Graph failure, retrying"
            );
        }
    }
}
