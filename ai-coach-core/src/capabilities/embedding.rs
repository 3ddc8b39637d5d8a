use async_trait::async_trait;

use crate::error::CoreResult;

/// A provider that turns text or image content into a fixed-dimension
/// embedding vector. `model_family` is carried on every stored vector
/// (`Embedding::embedding_model`, `spec.md` §3) so `VectorStore::search` can
/// refuse to compare embeddings produced by different families (Open
/// Question #1).
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Stable family identity, e.g. `"sentence-transformers/all-MiniLM-L6-v2"`.
    fn model_family(&self) -> &str;

    fn dimensions(&self) -> usize;

    async fn embed_text(&self, text: &str) -> CoreResult<Vec<f32>>;

    async fn embed_image(&self, image_bytes: &[u8]) -> CoreResult<Vec<f32>>;
}
