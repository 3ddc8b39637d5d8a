use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::capabilities::{ScoredVectorRecord, VectorStore};
use crate::error::CoreResult;

/// A retrieved record with its blended relevance score, the quantity the
/// consultation and recommendation engines actually rank on.
#[derive(Debug, Clone)]
pub struct RetrievedRecord {
    pub record: ScoredVectorRecord,
    pub blended_score: f32,
}

/// Unified multimodal retrieval (C4): blends cosine similarity against a
/// query embedding with a recency decay, so a highly relevant entry from six
/// months ago doesn't permanently outrank a merely-relevant one from
/// yesterday, per `spec.md` §4.4.
pub struct RetrievalService {
    store: Arc<dyn VectorStore>,
    /// Weight given to similarity vs. recency in the blend, in `[0, 1]`.
    similarity_weight: f32,
    /// Half-life, in days, of the recency component's exponential decay.
    recency_half_life_days: f32,
}

impl RetrievalService {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        RetrievalService { store, similarity_weight: 0.7, recency_half_life_days: 30.0 }
    }

    pub fn with_weights(mut self, similarity_weight: f32, recency_half_life_days: f32) -> Self {
        self.similarity_weight = similarity_weight.clamp(0.0, 1.0);
        self.recency_half_life_days = recency_half_life_days.max(0.001);
        self
    }

    fn recency_score(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> f32 {
        let age_days = (now - created_at).num_seconds().max(0) as f32 / 86_400.0;
        0.5_f32.powf(age_days / self.recency_half_life_days)
    }

    /// Fetch the `limit` most relevant records for `query` across
    /// `source_types`, scored by the similarity/recency blend and sorted
    /// descending. Rows whose raw cosine similarity falls below
    /// `similarity_threshold` are discarded before the recency blend is
    /// applied, per `spec.md` §4.4 ("Rows with similarity < similarity_
    /// threshold are discarded before blending"). `query_model` must match
    /// the family of `query`'s embedding; the underlying store rejects
    /// cross-family searches (Open Question in `SPEC_FULL.md` §3).
    pub async fn retrieve(
        &self,
        user_id: &str,
        query_model: &str,
        query: &[f32],
        source_types: &[&str],
        limit: usize,
        similarity_threshold: f32,
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<RetrievedRecord>> {
        // Over-fetch by similarity alone, then re-rank with recency blended in —
        // a record outside the top-N by similarity could still win the blend.
        let candidates = self
            .store
            .search(user_id, query_model, query, source_types, limit.saturating_mul(3).max(limit))
            .await?;

        let mut blended: Vec<RetrievedRecord> = candidates
            .into_iter()
            .filter(|scored| scored.similarity >= similarity_threshold)
            .map(|scored| {
                let recency = self.recency_score(scored.record.created_at, now);
                let blended_score =
                    self.similarity_weight * scored.similarity + (1.0 - self.similarity_weight) * recency;
                RetrievedRecord { record: scored, blended_score }
            })
            .collect();

        blended.sort_by(|a, b| b.blended_score.partial_cmp(&a.blended_score).unwrap_or(std::cmp::Ordering::Equal));
        blended.truncate(limit);

        Ok(blended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::VectorRecord;
    use async_trait::async_trait;
    use chrono::Duration;

    struct StubStore {
        rows: Vec<ScoredVectorRecord>,
    }

    #[async_trait]
    impl VectorStore for StubStore {
        async fn insert(&self, _record: VectorRecord) -> CoreResult<()> {
            Ok(())
        }

        async fn search(
            &self,
            _user_id: &str,
            _query_model: &str,
            _query: &[f32],
            _source_types: &[&str],
            _limit: usize,
        ) -> CoreResult<Vec<ScoredVectorRecord>> {
            Ok(self.rows.clone())
        }

        async fn delete_older_than(&self, _cutoff: DateTime<Utc>) -> CoreResult<u64> {
            Ok(0)
        }
    }

    fn scored(similarity: f32, age_days: i64, now: DateTime<Utc>) -> ScoredVectorRecord {
        ScoredVectorRecord {
            record: VectorRecord {
                id: uuid::Uuid::new_v4(),
                user_id: "u1".to_string(),
                embedding_model: "text-v1".to_string(),
                embedding: vec![0.1, 0.2],
                source_type: "meal".to_string(),
                source_id: uuid::Uuid::new_v4(),
                created_at: now - Duration::days(age_days),
            },
            similarity,
        }
    }

    #[tokio::test]
    async fn rows_below_threshold_are_discarded_before_blending() {
        let now = Utc::now();
        let store = Arc::new(StubStore { rows: vec![scored(0.9, 1, now), scored(0.2, 0, now)] });
        let service = RetrievalService::new(store);

        let results = service.retrieve("u1", "text-v1", &[0.1, 0.2], &["meal"], 10, 0.5, now).await.unwrap();

        assert_eq!(results.len(), 1);
        assert!((results[0].record.similarity - 0.9).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn recent_lower_similarity_can_outrank_stale_higher_similarity() {
        let now = Utc::now();
        let store = Arc::new(StubStore { rows: vec![scored(0.95, 400, now), scored(0.7, 0, now)] });
        let service = RetrievalService::new(store).with_weights(0.4, 14.0);

        let results = service.retrieve("u1", "text-v1", &[0.1, 0.2], &["meal"], 10, 0.0, now).await.unwrap();

        assert!((results[0].record.similarity - 0.7).abs() < f32::EPSILON);
    }
}
