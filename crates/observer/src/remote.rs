//! Deadline handling for calls to the Brigade API.

use brigade_sdk::ApiError;
use std::future::Future;
use std::time::Duration;

/// Runs `call` under its own deadline.
///
/// The deadline is independent of any cancellation token held by the caller,
/// so a call that has been issued is allowed to finish even if the task that
/// issued it is being cancelled.
pub(crate) async fn with_deadline<T, F>(deadline: Duration, call: F) -> Result<T, ApiError>
where
    F: Future<Output = Result<T, ApiError>>,
{
    tokio::time::timeout(deadline, call)
        .await
        .unwrap_or_else(|_| Err(ApiError::DeadlineExceeded(deadline)))
}
