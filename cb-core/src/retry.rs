//! Retry policy for outbound provider calls.
//!
//! Provider calls retry with exponential backoff (1 s base, doubling, up
//! to the configured attempts). Retries never apply to 4xx-class
//! validation failures, and a shutdown signal aborts the loop before the
//! next backoff wait.

use std::future::Future;
use std::time::Duration;

use cb_common::backoff;
use cb_tokio::notify_once::NotifyOnce;
use tracing::warn;

use crate::traits::ProviderError;

const RETRY_INITIAL_WAIT_MS: u64 = 1_000;

/// Runs `op` up to `max_attempts` times. `op_name` labels log lines.
pub async fn with_retries<T, F, Fut>(
    op_name: &str,
    max_attempts: u32,
    shutdown: &NotifyOnce,
    mut op: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    debug_assert!(max_attempts >= 1);
    let mut backoff_durations =
        backoff::iter_with_initial_wait_ms(RETRY_INITIAL_WAIT_MS);

    let mut attempt = 0u32;
    loop {
        attempt += 1;

        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_retryable() || attempt >= max_attempts {
            return Err(err);
        }

        let wait = backoff_durations
            .next()
            .unwrap_or(Duration::from_secs(32));
        warn!(
            "{op_name} attempt {attempt}/{max_attempts} failed: {err:#}; \
             retrying in {wait:?}"
        );

        // Abort before the next wait if a shutdown signal arrives.
        let mut shutdown = shutdown.clone();
        tokio::select! {
            // Mitigate possible select! race after a shutdown signal is sent
            biased;
            () = shutdown.recv() => {
                return Err(ProviderError::unavailable(format!(
                    "{op_name} aborted by shutdown after {attempt} attempts"
                )));
            }
            () = tokio::time::sleep(wait) => (),
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let shutdown = NotifyOnce::new();
        let calls = AtomicU32::new(0);

        let result = with_retries("test-op", 3, &shutdown, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ProviderError::unavailable("503"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn validation_failures_are_not_retried() {
        let shutdown = NotifyOnce::new();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> =
            with_retries("test-op", 5, &shutdown, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::validation("bad amount")) }
            })
            .await;

        assert!(!result.unwrap_err().is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_returns_last_error() {
        let shutdown = NotifyOnce::new();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> =
            with_retries("test-op", 3, &shutdown, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::unavailable("503")) }
            })
            .await;

        assert!(result.unwrap_err().is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_aborts_before_next_wait() {
        let shutdown = NotifyOnce::new();
        shutdown.send();

        let calls = AtomicU32::new(0);
        let result: Result<(), _> =
            with_retries("test-op", 5, &shutdown, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::unavailable("503")) }
            })
            .await;

        assert!(result.is_err());
        // One attempt ran; the backoff wait was skipped.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
