use std::sync::Arc;

use tracing::error;

use crate::capabilities::KVStore;
use crate::config::RateLimitPolicy;
use crate::error::{CoreError, CoreResult};

/// Outcome of a rate-limit check, carrying enough to populate `X-RateLimit-*`
/// response headers in the (out-of-scope) HTTP layer without recomputing
/// anything there.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub retry_after_secs: u64,
}

/// Sliding-window rate limiter backed by a [`KVStore`].
///
/// Grounded on the original Redis-backed limiter: each check evicts entries
/// older than the window, counts what remains, and atomically admits the new
/// request if under the limit. On any store failure the limiter fails open
/// — an unavailable Redis must never block the product, only degrade its
/// protection.
pub struct RateLimiter {
    store: Arc<dyn KVStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KVStore>) -> Self {
        RateLimiter { store }
    }

    /// Check and admit a request for `user_id` against `policy`, keyed by
    /// `{policy.prefix}:{user_id}`.
    pub async fn check(
        &self,
        user_id: &str,
        policy: RateLimitPolicy,
        now_millis: i64,
    ) -> CoreResult<RateLimitDecision> {
        let key = format!("{}:{}", policy.prefix, user_id);
        let window_millis = policy.window.as_millis() as i64;

        match self
            .store
            .sliding_window_admit(&key, now_millis, window_millis, policy.max_requests)
            .await
        {
            Ok(admission) => Ok(RateLimitDecision {
                allowed: admission.allowed,
                remaining: admission.remaining,
                retry_after_secs: admission.retry_after_secs,
            }),
            Err(err) => {
                error!(error = %err, key, "rate limiter store unavailable, failing open");
                Ok(RateLimitDecision {
                    allowed: true,
                    remaining: policy.max_requests,
                    retry_after_secs: 0,
                })
            }
        }
    }

    /// Convenience wrapper that turns a denied decision into a `RateLimited`
    /// error, for call sites that want `?` rather than branching on the
    /// decision themselves.
    pub async fn enforce(
        &self,
        user_id: &str,
        policy: RateLimitPolicy,
        now_millis: i64,
    ) -> CoreResult<RateLimitDecision> {
        let decision = self.check(user_id, policy, now_millis).await?;
        if !decision.allowed {
            return Err(CoreError::RateLimited { retry_after_secs: decision.retry_after_secs });
        }
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::capabilities::WindowAdmission;

    /// An in-process sliding-window store, mirroring the Redis sorted-set
    /// semantics `RedisKVStore` implements server-side via Lua, for tests
    /// that shouldn't need a live Redis.
    #[derive(Default)]
    struct InMemoryKVStore {
        windows: Mutex<HashMap<String, Vec<i64>>>,
    }

    #[async_trait]
    impl KVStore for InMemoryKVStore {
        async fn sliding_window_admit(
            &self,
            key: &str,
            now_millis: i64,
            window_millis: i64,
            max_requests: u32,
        ) -> CoreResult<WindowAdmission> {
            let mut windows = self.windows.lock().unwrap();
            let entries = windows.entry(key.to_string()).or_default();
            entries.retain(|&t| t >= now_millis - window_millis);

            let count = entries.len() as u32;
            let window_secs = (window_millis / 1000).max(1) as u64;

            if count >= max_requests {
                return Ok(WindowAdmission { allowed: false, remaining: 0, retry_after_secs: window_secs });
            }

            entries.push(now_millis);
            Ok(WindowAdmission { allowed: true, remaining: max_requests - count - 1, retry_after_secs: 0 })
        }
    }

    struct FailingKVStore;

    #[async_trait]
    impl KVStore for FailingKVStore {
        async fn sliding_window_admit(
            &self,
            _key: &str,
            _now_millis: i64,
            _window_millis: i64,
            _max_requests: u32,
        ) -> CoreResult<WindowAdmission> {
            Err(CoreError::UpstreamUnavailable("redis connection refused".to_string()))
        }
    }

    fn policy() -> RateLimitPolicy {
        RateLimitPolicy { prefix: "quick_entry", max_requests: 3, window: Duration::from_secs(60) }
    }

    /// Seed scenario 5 (`spec.md` §8): with `max=3, window=60s` and requests
    /// at `t=0,20,40`, a request at `t=50` is denied with `retry_after=60`;
    /// at `t=61` it is allowed with `remaining=1` once the `t=0` entry has
    /// aged out of the window.
    #[tokio::test]
    async fn sliding_window_matches_seed_scenario_five() {
        let limiter = RateLimiter::new(Arc::new(InMemoryKVStore::default()));
        let policy = policy();

        for t in [0, 20, 40] {
            let decision = limiter.check("u1", policy, t * 1000).await.unwrap();
            assert!(decision.allowed, "request at t={t} should be admitted");
        }

        let denied = limiter.check("u1", policy, 50_000).await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after_secs, 60);

        let admitted = limiter.check("u1", policy, 61_000).await.unwrap();
        assert!(admitted.allowed);
        assert_eq!(admitted.remaining, 1);
    }

    /// Boundary behavior (`spec.md` §8): at `count = max - 1` the limiter
    /// returns `remaining=0, allowed=true`; the very next request at
    /// `count = max` is denied with `retry_after = window`.
    #[tokio::test]
    async fn boundary_at_max_minus_one_and_at_max() {
        let limiter = RateLimiter::new(Arc::new(InMemoryKVStore::default()));
        let policy = policy();

        limiter.check("u1", policy, 0).await.unwrap();
        let second = limiter.check("u1", policy, 0).await.unwrap();
        assert!(second.allowed);
        assert_eq!(second.remaining, 0);

        let third = limiter.check("u1", policy, 0).await.unwrap();
        assert!(!third.allowed);
        assert_eq!(third.retry_after_secs, policy.window.as_secs());
    }

    #[tokio::test]
    async fn store_unavailable_fails_open() {
        let limiter = RateLimiter::new(Arc::new(FailingKVStore));
        let decision = limiter.check("u1", policy(), 0).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, policy().max_requests);
    }

    #[tokio::test]
    async fn enforce_surfaces_rate_limited_error_when_denied() {
        let limiter = RateLimiter::new(Arc::new(InMemoryKVStore::default()));
        let policy = policy();
        for _ in 0..3 {
            limiter.enforce("u1", policy, 0).await.unwrap();
        }

        let result = limiter.enforce("u1", policy, 0).await;
        assert!(matches!(result, Err(CoreError::RateLimited { .. })));
    }
}
