//! Long-running operation polling
//!
//! Every remote mutation returns an [`OperationHandle`]. The waiter polls it
//! until a terminal status, the timeout or cancellation, whichever comes
//! first. Poll errors are logged and polling continues; only an accepted
//! operation is ever re-polled, a rejected call is never resubmitted.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use convoy_common::Error;

use crate::client::{OperationHandle, OperationStatus};

/// How an operation ended when it did not fail
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationOutcome {
    /// The remote reported success
    Succeeded,
    /// The target object is gone
    NotFound,
}

/// Polls one operation handle to completion
#[derive(Clone, Copy, Debug)]
pub struct OperationWaiter {
    poll_interval: Duration,
    timeout: Duration,
}

impl OperationWaiter {
    /// Create a waiter with the given cadence and budget
    pub fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            poll_interval,
            timeout,
        }
    }

    /// Poll `handle` until it reaches a terminal status
    ///
    /// The handle is consumed; on timeout or cancellation it is dropped and
    /// the remote operation continues on its own.
    pub async fn wait(
        &self,
        handle: Box<dyn OperationHandle>,
        cancel: &CancellationToken,
    ) -> Result<OperationOutcome, Error> {
        let description = handle.description();
        let deadline = Instant::now() + self.timeout;
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let status = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::cancelled(&description)),
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(Error::operation_timed_out(&description, self.timeout))
                }
                status = handle.poll() => status,
            };

            match status {
                Ok(OperationStatus::Succeeded) => {
                    debug!(operation = %description, attempts, "operation succeeded");
                    return Ok(OperationOutcome::Succeeded);
                }
                Ok(OperationStatus::NotFound) => {
                    debug!(operation = %description, attempts, "operation target not found");
                    return Ok(OperationOutcome::NotFound);
                }
                Ok(OperationStatus::Failed { message }) => {
                    return Err(Error::operation_failed(&description, message));
                }
                Ok(OperationStatus::InProgress) => {
                    debug!(operation = %description, attempts, "operation in progress");
                }
                Err(e) => {
                    warn!(operation = %description, error = %e, "poll error, retrying");
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::cancelled(&description)),
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(Error::operation_timed_out(&description, self.timeout))
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}

/// Run a single remote call bounded by `timeout` and raced against `cancel`
pub(crate) async fn call<T, F>(
    operation: &str,
    timeout: Duration,
    cancel: &CancellationToken,
    fut: F,
) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::cancelled(operation)),
        result = tokio::time::timeout(timeout, fut) => match result {
            Ok(inner) => inner,
            Err(_) => Err(Error::operation_timed_out(operation, timeout)),
        },
    }
}
