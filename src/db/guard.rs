//! Cancellation and timeout guard for database operations.

use crate::error::{DbError, DbResult};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Run `operation` until it completes, the token is cancelled, or `limit` elapses.
///
/// An already-cancelled token fails before the future is polled. The future is
/// dropped on cancellation or timeout.
pub(crate) async fn guarded<T, F>(
    operation: &str,
    cancel: &CancellationToken,
    limit: Option<Duration>,
    fut: F,
) -> DbResult<T>
where
    F: Future<Output = DbResult<T>>,
{
    if cancel.is_cancelled() {
        return Err(DbError::cancelled(operation));
    }

    let bounded = async {
        match limit {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| DbError::timeout(operation, limit.as_secs() as u32))?,
            None => fut.await,
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DbError::cancelled(operation)),
        result = bounded => result,
    }
}
