use async_trait::async_trait;

use crate::error::CoreResult;

/// Outcome of one sliding-window admission check, mirroring the three values
/// the Redis-backed limiter in `spec.md` §4.2 hands back so an (out-of-scope)
/// HTTP layer can set `X-RateLimit-*` headers without recomputing anything.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowAdmission {
    pub allowed: bool,
    pub remaining: u32,
    pub retry_after_secs: u64,
}

/// The key/value surface the rate limiter (C2) needs. Backed by Redis sorted
/// sets in production; implementations must perform the evict/count/insert
/// sequence atomically (a pipeline or a Lua script), not as three separate
/// round trips, or concurrent requests can both observe capacity.
#[async_trait]
pub trait KVStore: Send + Sync {
    /// Evict entries older than `now_millis - window_millis` from the sorted
    /// set at `key`, count what remains, and if under `max_requests` insert
    /// `now_millis` and refresh the key's TTL to `window_millis`.
    async fn sliding_window_admit(
        &self,
        key: &str,
        now_millis: i64,
        window_millis: i64,
        max_requests: u32,
    ) -> CoreResult<WindowAdmission>;
}
