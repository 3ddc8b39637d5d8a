use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreResult;

/// A stored embedding plus the metadata the retrieval blend (C4) needs to
/// score it without a second round-trip to the primary store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: Uuid,
    pub user_id: String,
    pub embedding_model: String,
    pub embedding: Vec<f32>,
    pub source_type: String,
    pub source_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredVectorRecord {
    pub record: VectorRecord,
    pub similarity: f32,
}

/// A similarity-searchable store of multimodal embeddings, scoped per user.
/// Implementations are free to back this with pgvector, a dedicated vector
/// database, or an in-memory index for tests.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn insert(&self, record: VectorRecord) -> CoreResult<()>;

    /// Return the `limit` records with highest cosine similarity to `query`,
    /// restricted to `user_id` and to the same `embedding_model` family as
    /// `query_model` — searches across mismatched families are rejected by
    /// the caller before this is ever invoked (see `retrieval_service`).
    async fn search(
        &self,
        user_id: &str,
        query_model: &str,
        query: &[f32],
        source_types: &[&str],
        limit: usize,
    ) -> CoreResult<Vec<ScoredVectorRecord>>;

    /// Delete every row with `created_at < cutoff`, returning the number of
    /// rows removed. Backs `spec.md` §4.10's `cleanup_old_embeddings(days)`.
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> CoreResult<u64>;
}
