pub mod background_worker;
pub mod consultation_engine;
pub mod embedding_service;
pub mod enrichment_service;
pub mod model_router;
pub mod nutrition_calculator;
pub mod object_store_s3;
pub mod pattern_analyzer;
pub mod postgres_store;
pub mod prompt_security;
pub mod quick_entry_pipeline;
pub mod rate_limiter;
pub mod recommendation_engine;
pub mod redis_kv_store;
pub mod retrieval_service;
