//! Retry with linear backoff for geocoding calls.
//!
//! Only [`GeocodeError::Unavailable`] (timeouts, connection failures, 5xx, 429)
//! is retried. A well-formed "no result" answer is not an error at all and a
//! rejected query would be rejected again, so both return immediately.

use std::future::Future;
use std::time::Duration;

use crate::error::GeocodeError;

fn is_retriable(err: &GeocodeError) -> bool {
    matches!(err, GeocodeError::Unavailable { .. })
}

/// Runs `operation` up to `max_attempts` times.
///
/// The delay before retry `n` (1-based) is `backoff_base * n`, scaled by a
/// random jitter factor in `[0.75, 1.25)`.
///
/// # Backoff schedule (example with `backoff_base = 1s`, `max_attempts = 3`)
///
/// | Attempt | Sleep before it |
/// |---------|-----------------|
/// | 1 | none |
/// | 2 | ~1 s |
/// | 3 | ~2 s |
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_attempts: u32,
    backoff_base: Duration,
    mut operation: F,
) -> Result<T, GeocodeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GeocodeError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1u32;

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !is_retriable(&err) || attempt >= max_attempts {
            return Err(err);
        }

        let jitter = rand::random::<f64>() * 0.5 + 0.75;
        let delay = backoff_base.saturating_mul(attempt).mul_f64(jitter);
        tracing::warn!(
            attempt,
            max_attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "geocoding service unavailable; retrying after backoff"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn unavailable() -> GeocodeError {
        GeocodeError::Unavailable {
            reason: "HTTP 503".to_owned(),
        }
    }

    #[tokio::test]
    async fn succeeds_immediately_on_first_try() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&call_count);
        let result = retry_with_backoff(3, Duration::ZERO, || {
            let cc = Arc::clone(&cc);
            async move {
                cc.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, GeocodeError>(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_unavailable_then_succeeds() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&call_count);
        let result = retry_with_backoff(3, Duration::ZERO, || {
            let cc = Arc::clone(&cc);
            async move {
                let n = cc.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(unavailable())
                } else {
                    Ok::<u32, GeocodeError>(99)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 99);
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_after_max_attempts() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&call_count);
        let result = retry_with_backoff(3, Duration::ZERO, || {
            let cc = Arc::clone(&cc);
            async move {
                cc.fetch_add(1, Ordering::SeqCst);
                Err::<u32, GeocodeError>(unavailable())
            }
        })
        .await;
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
        assert!(matches!(result, Err(GeocodeError::Unavailable { .. })));
    }

    #[tokio::test]
    async fn does_not_retry_rejected_query() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&call_count);
        let result = retry_with_backoff(3, Duration::ZERO, || {
            let cc = Arc::clone(&cc);
            async move {
                cc.fetch_add(1, Ordering::SeqCst);
                Err::<u32, GeocodeError>(GeocodeError::Rejected { status: 400 })
            }
        })
        .await;
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(GeocodeError::Rejected { status: 400 })));
    }

    #[tokio::test]
    async fn zero_attempts_still_tries_once() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = Arc::clone(&call_count);
        let _ = retry_with_backoff(0, Duration::ZERO, || {
            let cc = Arc::clone(&cc);
            async move {
                cc.fetch_add(1, Ordering::SeqCst);
                Err::<u32, GeocodeError>(unavailable())
            }
        })
        .await;
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }
}
