//! Timeout enforcement.
//!
//! Every call that leaves the process goes through [`with_timeout`]. Timeout
//! errors are distinct from provider errors so the retry predicate can tell
//! them apart.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Failures produced by the resilience layer itself rather than the wrapped call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResilienceError {
    /// The call did not finish within its deadline.
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// The breaker is open and no fallback is configured.
    #[error("Circuit breaker is open for {0}")]
    CircuitOpen(String),
}

/// Run `fut` with a deadline, mapping expiry into the caller's error type.
pub async fn with_timeout<T, E, F>(limit: Duration, fut: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<ResilienceError>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ResilienceError::Timeout(limit.as_millis() as u64).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timeout_maps_to_error() {
        let res: Result<(), ResilienceError> = with_timeout(Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(())
        })
        .await;
        assert_eq!(res, Err(ResilienceError::Timeout(50)));
        assert_eq!(
            ResilienceError::Timeout(50).to_string(),
            "Operation timed out after 50ms"
        );
    }

    #[tokio::test]
    async fn test_fast_call_passes_through() {
        let res: Result<u32, ResilienceError> =
            with_timeout(Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(res, Ok(7));
    }
}
