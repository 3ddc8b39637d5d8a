use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

/// The modality an embedding was produced from, per `spec.md` §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "embedding_source_type", rename_all = "snake_case")]
pub enum EmbeddingSourceType {
    Meal,
    Activity,
    Workout,
    VoiceNote,
    ProgressPhoto,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Embedding {
    pub id: Uuid,
    pub user_id: String,
    pub source_type: EmbeddingSourceType,
    pub source_id: Uuid,
    pub embedding_model: String,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

/// A row on the server-side embedding queue `spec.md` §4.10's
/// `process_embeddings_task` drains: raw text still waiting to be embedded,
/// written by the outer queue transport when a vectorization task is
/// deferred rather than run inline (e.g. under the backpressure policy in
/// `spec.md` §5). `source_type` is kept as a plain string here rather than
/// [`EmbeddingSourceType`] since the queue also carries conversational
/// sources (`voice_note`) that aren't one of this crate's typed entries.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PendingEmbeddingJob {
    pub id: Uuid,
    pub user_id: String,
    pub source_type: String,
    pub source_id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
}
