//! Provider access-token cache.
//!
//! OAuth'd providers (the payment provider, the tax authority) hand out
//! short-lived bearer tokens. This cache is the only other piece of
//! in-process mutable state besides the OTP store: a [`tokio::sync::RwLock`]
//! around the current token, with a double-checked refresh under the write
//! lock so concurrent callers refresh exactly once. Tokens are considered
//! expired one minute before their actual expiry so in-flight requests
//! never carry a token that dies mid-call.

use std::future::Future;
use std::time::Duration;

use cb_common::time::TimestampMs;
use tokio::sync::RwLock;

use crate::traits::ProviderError;

/// The pre-expiry safety margin.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// A bearer token with its expiry instant.
#[derive(Clone, Debug)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: TimestampMs,
}

impl AccessToken {
    /// Whether the token is still usable at `now`, honoring the one-minute
    /// pre-expiry margin.
    fn is_fresh(&self, now: TimestampMs) -> bool {
        now.saturating_add(EXPIRY_MARGIN) < self.expires_at
    }
}

/// Caches one provider's access token.
pub struct TokenCache {
    current: RwLock<Option<AccessToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
        }
    }

    /// Returns the cached token, refreshing via `refresh` when the cache
    /// is empty or inside the expiry margin. Concurrent callers refresh at
    /// most once: the winner of the write lock re-checks before calling
    /// out.
    pub async fn get_or_refresh<F, Fut>(
        &self,
        refresh: F,
    ) -> Result<String, ProviderError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AccessToken, ProviderError>>,
    {
        let now = TimestampMs::now();

        // Fast path: a fresh token under the read lock.
        {
            let guard = self.current.read().await;
            if let Some(token) = guard.as_ref() {
                if token.is_fresh(now) {
                    return Ok(token.token.clone());
                }
            }
        }

        // Slow path: take the write lock and re-check; another caller may
        // have refreshed while we waited.
        let mut guard = self.current.write().await;
        if let Some(token) = guard.as_ref() {
            if token.is_fresh(now) {
                return Ok(token.token.clone());
            }
        }

        let token = refresh().await?;
        let bearer = token.token.clone();
        *guard = Some(token);
        Ok(bearer)
    }

    /// Drops the cached token, forcing the next caller to refresh. Used
    /// after a provider rejects a token early.
    pub async fn invalidate(&self) {
        *self.current.write().await = None;
    }
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    };

    use super::*;

    fn token_expiring_in(secs: u64) -> AccessToken {
        AccessToken {
            token: format!("tok-{secs}"),
            expires_at: TimestampMs::now()
                .saturating_add(Duration::from_secs(secs)),
        }
    }

    #[tokio::test]
    async fn caches_until_expiry_margin() {
        let cache = TokenCache::new();
        let refreshes = AtomicU32::new(0);

        for _ in 0..3 {
            let bearer = cache
                .get_or_refresh(|| {
                    refreshes.fetch_add(1, Ordering::SeqCst);
                    async { Ok(token_expiring_in(3600)) }
                })
                .await
                .unwrap();
            assert_eq!(bearer, "tok-3600");
        }

        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn token_within_margin_is_refreshed() {
        let cache = TokenCache::new();

        // 30 s left < 60 s margin, so the next get refreshes.
        let _ = cache
            .get_or_refresh(|| async { Ok(token_expiring_in(30)) })
            .await
            .unwrap();

        let bearer = cache
            .get_or_refresh(|| async { Ok(token_expiring_in(3600)) })
            .await
            .unwrap();
        assert_eq!(bearer, "tok-3600");
    }

    #[tokio::test]
    async fn concurrent_callers_refresh_once() {
        let cache = Arc::new(TokenCache::new());
        let refreshes = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let refreshes = refreshes.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_refresh(|| {
                        refreshes.fetch_add(1, Ordering::SeqCst);
                        async { Ok(token_expiring_in(3600)) }
                    })
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), "tok-3600");
        }

        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_refresh() {
        let cache = TokenCache::new();
        let _ = cache
            .get_or_refresh(|| async { Ok(token_expiring_in(3600)) })
            .await
            .unwrap();

        cache.invalidate().await;

        let refreshes = AtomicU32::new(0);
        let _ = cache
            .get_or_refresh(|| {
                refreshes.fetch_add(1, Ordering::SeqCst);
                async { Ok(token_expiring_in(7200)) }
            })
            .await
            .unwrap();
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    }
}
