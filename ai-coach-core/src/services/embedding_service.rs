use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::capabilities::{EmbeddingModel, VectorRecord, VectorStore};
use crate::error::{CoreError, CoreResult};
use crate::models::entry::{ActivityEntry, MealEntry, WorkoutEntry};

/// Generates and persists embeddings for newly logged entries.
///
/// Grounded on the original embedding service's per-entity text formatting:
/// each entry type is rendered to a short natural-language description
/// before being embedded, so semantically similar entries (a "leg day" vs.
/// "squat workout") land close together regardless of field-level wording.
pub struct EmbeddingService {
    model: Arc<dyn EmbeddingModel>,
    store: Arc<dyn VectorStore>,
}

impl EmbeddingService {
    pub fn new(model: Arc<dyn EmbeddingModel>, store: Arc<dyn VectorStore>) -> Self {
        EmbeddingService { model, store }
    }

    async fn embed_and_store(
        &self,
        user_id: &str,
        source_type: &str,
        source_id: Uuid,
        text: &str,
    ) -> CoreResult<()> {
        if text.trim().is_empty() {
            return Err(CoreError::invalid_input("cannot embed empty text"));
        }

        let embedding = self.model.embed_text(text).await?;
        self.store
            .insert(VectorRecord {
                id: Uuid::new_v4(),
                user_id: user_id.to_string(),
                embedding_model: self.model.model_family().to_string(),
                embedding,
                source_type: source_type.to_string(),
                source_id,
                created_at: Utc::now(),
            })
            .await
    }

    pub async fn embed_meal(&self, meal: &MealEntry) -> CoreResult<()> {
        let text = format_meal(meal);
        self.embed_and_store(&meal.user_id, "meal", meal.id, &text).await
    }

    pub async fn embed_activity(&self, activity: &ActivityEntry) -> CoreResult<()> {
        let text = format_activity(activity);
        self.embed_and_store(&activity.user_id, "activity", activity.id, &text).await
    }

    pub async fn embed_workout(&self, workout: &WorkoutEntry) -> CoreResult<()> {
        let text = format_workout(workout);
        self.embed_and_store(&workout.user_id, "workout", workout.id, &text).await
    }

    pub async fn embed_note(&self, user_id: &str, note_id: Uuid, content: &str) -> CoreResult<()> {
        self.embed_and_store(user_id, "voice_note", note_id, content).await
    }

    /// Generic entry-text embedding keyed by an already-resolved
    /// `source_type` (the `entry_type → source_type` mapping from
    /// `spec.md` §4.6 is the caller's job, same as
    /// [`embed_meal`](Self::embed_meal)/`embed_activity`/`embed_workout`
    /// above — this is the single dispatch point
    /// [`Task::VectorizeEntry`](crate::services::background_worker::Task)
    /// resolves to, for whichever entry type the quick-entry pipeline just
    /// persisted.
    pub async fn embed_raw(&self, user_id: &str, source_type: &str, source_id: Uuid, text: &str) -> CoreResult<()> {
        self.embed_and_store(user_id, source_type, source_id, text).await
    }

    /// `source_type` is the owning row's embedding source type (`"meal"` for
    /// a meal photo, `"progress_photo"` for a standalone measurement photo)
    /// — an image embedding is attributed to whatever it's a photo of, not
    /// always a progress photo.
    pub async fn embed_image(
        &self,
        user_id: &str,
        source_type: &str,
        source_id: Uuid,
        image_bytes: &[u8],
    ) -> CoreResult<()> {
        let embedding = self.model.embed_image(image_bytes).await?;
        self.store
            .insert(VectorRecord {
                id: Uuid::new_v4(),
                user_id: user_id.to_string(),
                embedding_model: self.model.model_family().to_string(),
                embedding,
                source_type: source_type.to_string(),
                source_id,
                created_at: Utc::now(),
            })
            .await
    }
}

fn format_meal(meal: &MealEntry) -> String {
    format!(
        "Meal: {}\nType: {}\nCalories: {}\nMacros: {}g protein, {}g carbs, {}g fat",
        meal.name, meal.meal_type, meal.calories, meal.protein_g, meal.carbs_g, meal.fat_g
    )
}

fn format_activity(activity: &ActivityEntry) -> String {
    format!(
        "Activity: {}\nType: {}\nDuration: {} min",
        activity.name,
        activity.activity_type,
        activity.elapsed_time_seconds / 60
    )
}

fn format_workout(workout: &WorkoutEntry) -> String {
    format!(
        "Workout\nDuration: {} minutes\nMuscle groups: {}\nVolume load: {}",
        workout.duration_minutes,
        workout.muscle_groups.join(", "),
        workout.volume_load
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::capabilities::ScoredVectorRecord;
    use crate::models::entry::EntrySource;

    struct StubEmbeddingModel;

    #[async_trait]
    impl EmbeddingModel for StubEmbeddingModel {
        fn model_family(&self) -> &str {
            "stub-text-v1"
        }

        fn dimensions(&self) -> usize {
            3
        }

        async fn embed_text(&self, _text: &str) -> CoreResult<Vec<f32>> {
            Ok(vec![0.1, 0.2, 0.3])
        }

        async fn embed_image(&self, _image_bytes: &[u8]) -> CoreResult<Vec<f32>> {
            Ok(vec![0.4, 0.5, 0.6])
        }
    }

    #[derive(Default)]
    struct RecordingVectorStore {
        inserted: Mutex<Vec<VectorRecord>>,
    }

    #[async_trait]
    impl VectorStore for RecordingVectorStore {
        async fn insert(&self, record: VectorRecord) -> CoreResult<()> {
            self.inserted.lock().unwrap().push(record);
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
            Ok(Vec::new())
        }

        async fn delete_older_than(&self, cutoff: chrono::DateTime<Utc>) -> CoreResult<u64> {
            let mut inserted = self.inserted.lock().unwrap();
            let before = inserted.len();
            inserted.retain(|record| record.created_at >= cutoff);
            Ok((before - inserted.len()) as u64)
        }
    }

    fn meal() -> MealEntry {
        MealEntry {
            id: Uuid::new_v4(),
            user_id: "u1".to_string(),
            name: "Chicken and rice".to_string(),
            meal_type: "lunch".to_string(),
            calories: 500.0,
            protein_g: 35.0,
            carbs_g: 40.0,
            fat_g: 17.0,
            fiber_g: 5.0,
            sugar_g: 5.0,
            sodium_mg: 400.0,
            foods: serde_json::json!([]),
            image_url: None,
            confidence_score: 0.9,
            meal_quality_score: None,
            macro_balance_score: None,
            adherence_to_goals: None,
            enrichment_tags: Vec::new(),
            logged_at: Utc::now(),
            source: EntrySource::QuickEntry,
            notes: None,
        }
    }

    #[tokio::test]
    async fn embed_meal_stores_a_record_stamped_with_the_model_family() {
        let store = Arc::new(RecordingVectorStore::default());
        let service = EmbeddingService::new(Arc::new(StubEmbeddingModel), store.clone());

        let entry = meal();
        service.embed_meal(&entry).await.unwrap();

        let inserted = store.inserted.lock().unwrap();
        assert_eq!(inserted.len(), 1);
        assert_eq!(inserted[0].source_type, "meal");
        assert_eq!(inserted[0].source_id, entry.id);
        assert_eq!(inserted[0].embedding_model, "stub-text-v1");
    }

    #[tokio::test]
    async fn embed_note_rejects_empty_text_without_storing_anything() {
        let store = Arc::new(RecordingVectorStore::default());
        let service = EmbeddingService::new(Arc::new(StubEmbeddingModel), store.clone());

        let result = service.embed_note("u1", Uuid::new_v4(), "   ").await;

        assert!(result.is_err());
        assert!(store.inserted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn embed_raw_stores_under_the_caller_supplied_source_type() {
        let store = Arc::new(RecordingVectorStore::default());
        let service = EmbeddingService::new(Arc::new(StubEmbeddingModel), store.clone());

        let source_id = Uuid::new_v4();
        service.embed_raw("u1", "activity", source_id, "ran 5k this morning").await.unwrap();

        let inserted = store.inserted.lock().unwrap();
        assert_eq!(inserted.len(), 1);
        assert_eq!(inserted[0].source_type, "activity");
        assert_eq!(inserted[0].source_id, source_id);
    }

    #[tokio::test]
    async fn embed_image_uses_the_image_embedding_branch() {
        let store = Arc::new(RecordingVectorStore::default());
        let service = EmbeddingService::new(Arc::new(StubEmbeddingModel), store.clone());

        service.embed_image("u1", "meal", Uuid::new_v4(), b"fake-jpeg-bytes").await.unwrap();

        let inserted = store.inserted.lock().unwrap();
        assert_eq!(inserted[0].source_type, "meal");
        assert_eq!(inserted[0].embedding, vec![0.4, 0.5, 0.6]);
    }
}
