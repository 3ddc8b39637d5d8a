mod app;
mod database;

pub use app::{AppConfig, RateLimitPolicies, RateLimitPolicy};
pub use database::DatabaseConfig;

/// Initialize the global tracing subscriber.
///
/// This crate has no `main.rs` of its own (HTTP/CLI entry points live
/// outside the core), so callers invoke this once at process start instead
/// of relying on a binary's bootstrap.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
