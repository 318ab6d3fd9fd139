//! Timeout enforcement.
//!
//! Every outbound call runs under the target's declared timeout; an elapsed
//! deadline is reported as [`ErrorKind::Timeout`], distinct from connection
//! failures.

use std::future::Future;
use std::time::Duration;

use tokio::time;

use crate::error::ErrorKind;

/// Run `fut` under `limit`, folding an elapsed deadline into the error type.
pub async fn with_timeout<T, E, F>(limit: Duration, fut: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<ErrorKind>,
{
    match time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(E::from(ErrorKind::Timeout)),
    }
}
