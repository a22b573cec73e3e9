//! Deadline guard for provider calls
//!
//! Cancellation is best-effort. When the limit elapses the guarded future is
//! dropped, which aborts any I/O still pending inside this process, but a
//! request body already sent may keep being processed by the backend (and
//! billed) after the guard has reported a timeout.

use std::future::Future;
use std::time::Duration;

use crate::error::TimeoutError;

/// Race `operation` against `limit`
pub async fn with_timeout<F>(operation: F, limit: Duration) -> Result<F::Output, TimeoutError>
where
    F: Future,
{
    tokio::time::timeout(limit, operation)
        .await
        .map_err(|_| TimeoutError { limit })
}
