use anyhow::Result;
use std::env;
use std::time::Duration;

/// Sliding-window rate-limit policy for one endpoint prefix, per `spec.md` §4.2.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    pub prefix: &'static str,
    pub max_requests: u32,
    pub window: Duration,
}

/// The predefined per-endpoint policies from `spec.md` §4.2's table.
pub struct RateLimitPolicies;

impl RateLimitPolicies {
    pub const COACH_CHAT: RateLimitPolicy = RateLimitPolicy {
        prefix: "coach_chat",
        max_requests: 100,
        window: Duration::from_secs(86_400),
    };

    pub const QUICK_ENTRY: RateLimitPolicy = RateLimitPolicy {
        prefix: "quick_entry",
        max_requests: 200,
        window: Duration::from_secs(86_400),
    };

    pub const PROGRAM_GENERATION: RateLimitPolicy = RateLimitPolicy {
        prefix: "program_generation",
        max_requests: 5,
        window: Duration::from_secs(2_592_000),
    };

    pub const AI_API: RateLimitPolicy = RateLimitPolicy {
        prefix: "ai_api",
        max_requests: 500,
        window: Duration::from_secs(86_400),
    };

    pub fn all() -> &'static [RateLimitPolicy] {
        &[
            Self::COACH_CHAT,
            Self::QUICK_ENTRY,
            Self::PROGRAM_GENERATION,
            Self::AI_API,
        ]
    }

    pub fn by_prefix(prefix: &str) -> Option<RateLimitPolicy> {
        Self::all().iter().copied().find(|p| p.prefix == prefix)
    }
}

/// Process-wide configuration for the core, loaded from the environment the
/// same way `AppConfig::from_env` in the surrounding crates does.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: String,
    pub log_level: String,

    /// Symbolic provider identity for the "fast" model-router slot (§4.1).
    pub fast_provider_model: String,
    /// Symbolic provider identity for the "accurate" model-router slot.
    pub accurate_provider_model: String,

    pub text_embedding_model: String,
    pub image_embedding_model: String,

    pub redis_url: String,
    pub object_storage_bucket: String,

    pub request_deadline: Duration,
    pub program_generation_deadline: Duration,
    pub rate_limiter_deadline: Duration,

    pub worker_queue_high_water_mark: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let fast_provider_model =
            env::var("FAST_MODEL").unwrap_or_else(|_| "fast:default".to_string());
        let accurate_provider_model =
            env::var("ACCURATE_MODEL").unwrap_or_else(|_| "accurate:default".to_string());

        let text_embedding_model = env::var("TEXT_EMBEDDING_MODEL")
            .unwrap_or_else(|_| "sentence-transformers/all-MiniLM-L6-v2".to_string());
        let image_embedding_model =
            env::var("IMAGE_EMBEDDING_MODEL").unwrap_or_else(|_| "clip-vit-base-patch32".to_string());

        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let object_storage_bucket =
            env::var("OBJECT_STORAGE_BUCKET").unwrap_or_else(|_| "ai-coach-media".to_string());

        let request_deadline_secs = env::var("REQUEST_DEADLINE_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .unwrap_or(30);
        let program_generation_deadline_secs = env::var("PROGRAM_GENERATION_DEADLINE_SECS")
            .unwrap_or_else(|_| "120".to_string())
            .parse()
            .unwrap_or(120);
        let rate_limiter_deadline_secs = env::var("RATE_LIMITER_DEADLINE_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);

        let worker_queue_high_water_mark = env::var("WORKER_QUEUE_HIGH_WATER_MARK")
            .unwrap_or_else(|_| "1000".to_string())
            .parse()
            .unwrap_or(1000);

        Ok(AppConfig {
            environment,
            log_level,
            fast_provider_model,
            accurate_provider_model,
            text_embedding_model,
            image_embedding_model,
            redis_url,
            object_storage_bucket,
            request_deadline: Duration::from_secs(request_deadline_secs),
            program_generation_deadline: Duration::from_secs(program_generation_deadline_secs),
            rate_limiter_deadline: Duration::from_secs(rate_limiter_deadline_secs),
            worker_queue_high_water_mark,
        })
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
