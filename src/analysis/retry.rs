use std::future::Future;
use std::time::Duration;

use tracing::warn;

use super::AnalyzeError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Runs `op` up to `max_attempts` times, retrying only transient failures
/// (quota, network, service unavailable). Before attempt n (n >= 2) it
/// suspends for 2^(n-1) seconds; the delay is cooperative and never blocks
/// other tasks. Exhaustion yields `RetriesExhausted` wrapping the last error;
/// non-transient failures return immediately.
pub async fn with_retry<T, F, Fut>(mut op: F, max_attempts: u32) -> Result<T, AnalyzeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AnalyzeError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut last = None;

    for attempt in 1..=max_attempts {
        if attempt > 1 {
            let delay = Duration::from_secs(1u64 << (attempt - 1));
            tokio::time::sleep(delay).await;
        }
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                warn!(attempt, max_attempts, error = %e, "transient analysis failure");
                last = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(AnalyzeError::RetriesExhausted {
        attempts: max_attempts,
        source: Box::new(last.unwrap_or(AnalyzeError::Unknown("no attempt recorded".into()))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn quota() -> AnalyzeError {
        AnalyzeError::QuotaExceeded("slow down".into())
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_retry_then_succeed() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let out = with_retry(
            move || {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(AnalyzeError::Network("reset".into()))
                    } else {
                        Ok(7u32)
                    }
                }
            },
            3,
        )
        .await;
        assert_eq!(out.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn quota_failures_exhaust_after_max_attempts() {
        // Three quota errors in a row with max 3: the would-be successful
        // fourth attempt must never be reached.
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let out: Result<u32, _> = with_retry(
            move || {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) < 3 {
                        Err(quota())
                    } else {
                        Ok(99)
                    }
                }
            },
            3,
        )
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match out.unwrap_err() {
            AnalyzeError::RetriesExhausted { attempts, source } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*source, AnalyzeError::QuotaExceeded(_)));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn bad_request_never_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let out: Result<u32, _> = with_retry(
            move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(AnalyzeError::BadRequest("corrupt image".into()))
                }
            },
            3,
        )
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(out.unwrap_err(), AnalyzeError::BadRequest(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_is_exponential_seconds() {
        // Attempts 2 and 3 wait 2s and 4s respectively: 6s total on the
        // paused clock.
        let start = tokio::time::Instant::now();
        let _ = with_retry::<u32, _, _>(|| async { Err(quota()) }, 3).await;
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }
}
