use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::capabilities::{ChatMessage, ObjectStore, SpeechToText, VisionModel};
use crate::error::{CoreError, CoreResult};
use crate::models::entry::{
    compute_volume_load, infer_muscle_groups, ActivityEntry, EntrySource, EntryType, ExerciseSet,
    FoodItem, MealEntry, MeasurementEntry, NoteEntry, WorkoutEntry,
};
use crate::services::background_worker::Task;
use crate::services::model_router::{ModelRouter, TaskType};
use crate::services::prompt_security::sanitize_for_prompt;

/// Below this confidence, a classification is not trusted enough to create
/// its proposed typed entry; the raw text is persisted as an unclassified
/// note instead, per `spec.md` §4.6.
pub const MIN_CLASSIFICATION_CONFIDENCE: f32 = 0.4;

/// Raw multimodal input to the pipeline. At least one of `text`, `image`,
/// `audio`, or `pdf` must be present.
#[derive(Debug, Clone, Default)]
pub struct QuickEntryInput {
    pub text: Option<String>,
    pub image_bytes: Option<Vec<u8>>,
    pub audio_bytes: Option<Vec<u8>>,
    pub pdf_bytes: Option<Vec<u8>>,
    /// Caller-supplied override that skips type classification and forces a
    /// type (the user tapped a specific "log a meal" button, say).
    pub force_type: Option<EntryType>,
}

#[derive(Debug, Clone, Deserialize)]
struct ClassificationResponse {
    #[serde(rename = "type")]
    entry_type: String,
    confidence: f32,
    data: Value,
    #[serde(default)]
    #[allow(dead_code)]
    suggestions: Vec<String>,
}

/// The result of the preview stage: classified but not yet persisted. The
/// caller shows this to the user (or a trusted caller skips straight to
/// [`QuickEntryPipeline::confirm`]) before anything is written.
#[derive(Debug, Clone)]
pub struct Classification {
    pub extracted_text: String,
    pub entry_type: String,
    pub confidence: f32,
    pub data: Value,
}

/// The classified and structurally-typed result of running an entry through
/// the pipeline, ready for enrichment (C7) and persistence.
#[derive(Debug, Clone)]
pub enum ClassifiedEntry {
    Meal(MealEntry),
    Activity(ActivityEntry),
    Workout(WorkoutEntry),
    Measurement(MeasurementEntry),
    Note(NoteEntry),
}

impl ClassifiedEntry {
    pub fn entry_type(&self) -> EntryType {
        match self {
            ClassifiedEntry::Meal(_) => EntryType::Meal,
            ClassifiedEntry::Activity(_) => EntryType::Activity,
            ClassifiedEntry::Workout(_) => EntryType::Workout,
            ClassifiedEntry::Measurement(_) => EntryType::Measurement,
            ClassifiedEntry::Note(_) => EntryType::Note,
        }
    }
}

/// Turns raw multimodal input into a typed, persistable entry: extracts
/// text from every modality present, classifies it against the closed set
/// of entry types, and builds the corresponding typed struct.
///
/// The default public contract is [`preview`](Self::preview) followed by
/// [`confirm`](Self::confirm) so a caller can show the user what was
/// extracted before anything is written; [`process`](Self::process) is
/// offered as a convenience for trusted callers that want both steps in one
/// call, e.g. a background import.
///
/// Grounded on the original quick-entry service's extract -> classify ->
/// build pipeline, generalized here into explicit stages so each can be
/// unit-tested independently of the upstream models.
pub struct QuickEntryPipeline {
    router: Arc<ModelRouter>,
    vision: Option<Arc<dyn VisionModel>>,
    speech: Option<Arc<dyn SpeechToText>>,
    object_store: Option<Arc<dyn ObjectStore>>,
}

impl QuickEntryPipeline {
    pub fn new(
        router: Arc<ModelRouter>,
        vision: Option<Arc<dyn VisionModel>>,
        speech: Option<Arc<dyn SpeechToText>>,
        object_store: Option<Arc<dyn ObjectStore>>,
    ) -> Self {
        QuickEntryPipeline { router, vision, speech, object_store }
    }

    /// Combine every modality present in `input` into a single text blob to
    /// classify. A failure in any one branch (no vision model configured, a
    /// transcription error, an unparseable PDF) does not fail the whole
    /// call — it inserts a `"FAILED: ..."` sentinel line and the remaining
    /// branches still run, per `spec.md` §4.6.
    async fn extract_all_text(&self, input: &QuickEntryInput) -> CoreResult<String> {
        let mut parts = Vec::new();

        if let Some(text) = &input.text {
            if !text.trim().is_empty() {
                parts.push(text.clone());
            }
        }

        if let Some(image_bytes) = &input.image_bytes {
            match &self.vision {
                Some(vision) => match vision
                    .describe(image_bytes, "Describe this food or fitness-related photo in detail.")
                    .await
                {
                    Ok(description) => parts.push(description),
                    Err(err) => parts.push(format!("FAILED: vision extraction: {err}")),
                },
                None => parts.push("FAILED: vision extraction: no vision model configured".to_string()),
            }
        }

        if let Some(audio_bytes) = &input.audio_bytes {
            match &self.speech {
                Some(speech) => match speech.transcribe(audio_bytes, None).await {
                    Ok(transcript) => parts.push(transcript),
                    Err(err) => parts.push(format!("FAILED: audio transcription: {err}")),
                },
                None => parts.push("FAILED: audio transcription: no speech-to-text model configured".to_string()),
            }
        }

        if let Some(pdf_bytes) = &input.pdf_bytes {
            match extract_pdf_text(pdf_bytes) {
                Ok(text) => parts.push(text),
                Err(err) => parts.push(format!("FAILED: pdf extraction: {err}")),
            }
        }

        if parts.is_empty() {
            return Err(CoreError::invalid_input("quick entry requires text, image, audio, or pdf input"));
        }

        Ok(parts.join("\n"))
    }

    fn classification_prompt(force_type: Option<EntryType>, historical_pattern: Option<&str>) -> String {
        let instruction = match force_type {
            Some(entry_type) => format!(
                "The user has indicated this is a {} entry. Extract all relevant data for it; do not \
                 reconsider the type.",
                entry_type.as_str()
            ),
            None => "Classify the entry into exactly one of: meal, activity, workout, measurement, \
                     note, unknown."
                .to_string(),
        };

        let pattern_hint = match historical_pattern {
            Some(pattern) => format!(
                "\n\nThe user's recent similar entries look like this; use it to fill in fields the \
                 text under-specifies, but do not let it override what the text actually says:\n{pattern}"
            ),
            None => String::new(),
        };

        format!(
            "{instruction}{pattern_hint}\n\nReturn ONLY a JSON object: {{\"type\": \"meal|activity|workout|measurement|note|unknown\", \
             \"confidence\": 0.0-1.0, \"data\": {{...type-specific fields...}}, \"suggestions\": [...]}}"
        )
    }

    async fn classify(
        &self,
        text: &str,
        force_type: Option<EntryType>,
        historical_pattern: Option<&str>,
    ) -> CoreResult<ClassificationResponse> {
        let sanitized = sanitize_for_prompt(text);
        let messages = vec![
            ChatMessage::system(
                "You are a fitness coach assistant that classifies and extracts structured data from user entries.",
            ),
            ChatMessage::user(format!(
                "{}\n\nEntry:\n{}",
                Self::classification_prompt(force_type, historical_pattern),
                sanitized
            )),
        ];

        let config = crate::services::model_router::TaskConfig { prioritize_speed: false, prioritize_accuracy: true };
        let completion = self.router.complete_with(TaskType::StructuredOutput, &messages, config).await?;
        serde_json::from_str(&completion.content)
            .map_err(|err| CoreError::UpstreamUnavailable(format!("classification response was not valid JSON: {err}")))
    }

    /// Extract and classify `input`, without persisting anything. Pass a
    /// pre-formatted `historical_pattern` summary (from the C5 pattern
    /// analyzer, e.g. [`crate::services::pattern_analyzer::ActivityPattern`]'s
    /// `Display`-style rendering) to seed under-specified fields.
    ///
    /// When `input.force_type` is set, the model is still called to extract
    /// structured fields, but its proposed `type` is ignored: the caller's
    /// type always wins and `confidence` is forced to `1.0`, per `spec.md`
    /// §4.6 ("When `manual_type` is supplied, `type` is overwritten to it and
    /// `confidence` set to 1.0 after the call returns").
    pub async fn preview(
        &self,
        input: &QuickEntryInput,
        historical_pattern: Option<&str>,
    ) -> CoreResult<Classification> {
        let extracted_text = self.extract_all_text(input).await?;
        let response = self.classify(&extracted_text, input.force_type, historical_pattern).await?;

        let (entry_type, confidence) = match input.force_type {
            Some(forced) => (forced.as_str().to_string(), 1.0),
            None => (response.entry_type, response.confidence),
        };

        Ok(Classification { extracted_text, entry_type, confidence, data: response.data })
    }

    /// Build the typed entry for a previously-previewed classification and
    /// the background tasks that should vectorize it. Below
    /// [`MIN_CLASSIFICATION_CONFIDENCE`] (and with no manual override), the
    /// result degrades to an unclassified note rather than failing outright
    /// — a user's entry should never be silently dropped.
    ///
    /// When `image_bytes` is present and an object store is configured, the
    /// image is uploaded and its public URL stashed on the resulting meal
    /// row before anything is returned, and a second, separate
    /// `Task::VectorizeImage` is emitted alongside the text vectorization
    /// task, per `spec.md` §4.6 ("Image handling").
    pub async fn confirm(
        &self,
        user_id: &str,
        classification: Classification,
        image_bytes: Option<&[u8]>,
    ) -> CoreResult<(ClassifiedEntry, Vec<Task>)> {
        let Classification { extracted_text, entry_type, confidence, data } = classification;

        let mut entry = if confidence < MIN_CLASSIFICATION_CONFIDENCE || entry_type == "unknown" {
            ClassifiedEntry::Note(unclassified_note(user_id, &extracted_text, confidence))
        } else {
            build_entry(user_id, &entry_type, confidence, data, &extracted_text)?
        };

        let mut tasks = vec![Task::VectorizeEntry {
            user_id: user_id.to_string(),
            source_type: entry.entry_type().embedding_source_type().to_string(),
            source_id: entry_id(&entry),
            text: extracted_text,
        }];

        if let (Some(bytes), Some(object_store)) = (image_bytes, &self.object_store) {
            let source_id = entry_id(&entry);
            let key = format!("quick-entry/{user_id}/{source_id}.jpg");
            let url = object_store.upload(&key, "image/jpeg", bytes.to_vec()).await?;

            if let ClassifiedEntry::Meal(meal) = &mut entry {
                meal.image_url = Some(url);
            }

            tasks.push(Task::VectorizeImage {
                user_id: user_id.to_string(),
                source_type: entry.entry_type().embedding_source_type().to_string(),
                source_id,
                image_bytes: bytes.to_vec(),
            });
        }

        Ok((entry, tasks))
    }

    /// Run the full pipeline in one call: extract, classify, and build a
    /// typed entry for `user_id`. A convenience wrapper over
    /// [`preview`](Self::preview) + [`confirm`](Self::confirm) for trusted
    /// callers that don't need a user-facing review step.
    pub async fn process(
        &self,
        user_id: &str,
        input: QuickEntryInput,
        historical_pattern: Option<&str>,
    ) -> CoreResult<(ClassifiedEntry, Vec<Task>)> {
        let image_bytes = input.image_bytes.clone();
        let classification = self.preview(&input, historical_pattern).await?;
        self.confirm(user_id, classification, image_bytes.as_deref()).await
    }
}

fn entry_id(entry: &ClassifiedEntry) -> Uuid {
    match entry {
        ClassifiedEntry::Meal(e) => e.id,
        ClassifiedEntry::Activity(e) => e.id,
        ClassifiedEntry::Workout(e) => e.id,
        ClassifiedEntry::Measurement(e) => e.id,
        ClassifiedEntry::Note(e) => e.id,
    }
}

/// Extract plain text from a PDF attachment (e.g. an exported lab panel or
/// meal plan). Runs the blocking `pdf-extract` parse on the calling task;
/// callers on a shared runtime should route this through
/// `tokio::task::spawn_blocking` if PDFs are large or frequent.
fn extract_pdf_text(pdf_bytes: &[u8]) -> CoreResult<String> {
    pdf_extract::extract_text_from_mem(pdf_bytes)
        .map_err(|err| CoreError::invalid_input(format!("could not extract text from pdf: {err}")))
}

fn unclassified_note(user_id: &str, text: &str, confidence: f32) -> NoteEntry {
    NoteEntry {
        id: Uuid::new_v4(),
        user_id: user_id.to_string(),
        title: None,
        content: text.to_string(),
        category: None,
        sentiment: None,
        sentiment_score: None,
        tags: vec!["unclassified".to_string()],
        logged_at: Utc::now(),
        source: EntrySource::QuickEntry,
        confidence_score: confidence,
    }
}

fn field_f32(data: &Value, key: &str) -> f32 {
    data.get(key).and_then(Value::as_f64).unwrap_or(0.0) as f32
}

fn field_str(data: &Value, key: &str) -> String {
    data.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

fn build_entry(
    user_id: &str,
    entry_type: &str,
    confidence: f32,
    data: Value,
    raw_text: &str,
) -> CoreResult<ClassifiedEntry> {
    let now = Utc::now();

    match entry_type {
        "meal" => {
            let foods: Vec<FoodItem> = data
                .get("foods")
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default();

            Ok(ClassifiedEntry::Meal(MealEntry {
                id: Uuid::new_v4(),
                user_id: user_id.to_string(),
                name: field_str(&data, "meal_name"),
                meal_type: field_str(&data, "meal_type"),
                calories: field_f32(&data, "calories"),
                protein_g: field_f32(&data, "protein_g"),
                carbs_g: field_f32(&data, "carbs_g"),
                fat_g: field_f32(&data, "fat_g"),
                fiber_g: field_f32(&data, "fiber_g"),
                sugar_g: field_f32(&data, "sugar_g"),
                sodium_mg: field_f32(&data, "sodium_mg"),
                foods: serde_json::to_value(foods).unwrap_or(Value::Null),
                image_url: None,
                confidence_score: confidence,
                meal_quality_score: None,
                macro_balance_score: None,
                adherence_to_goals: None,
                enrichment_tags: Vec::new(),
                logged_at: now,
                source: EntrySource::QuickEntry,
                notes: data.get("notes").and_then(Value::as_str).map(str::to_string),
            }))
        }
        "activity" => Ok(ClassifiedEntry::Activity(ActivityEntry {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            name: field_str(&data, "activity_name"),
            activity_type: field_str(&data, "activity_type"),
            sport_type: field_str(&data, "activity_type"),
            elapsed_time_seconds: (field_f32(&data, "duration_minutes") * 60.0) as i32,
            moving_time_seconds: (field_f32(&data, "duration_minutes") * 60.0) as i32,
            distance_meters: data.get("distance_km").and_then(Value::as_f64).map(|km| (km * 1000.0) as f32),
            calories: data.get("calories_burned").and_then(Value::as_f64).map(|c| c as f32),
            perceived_exertion: None,
            mood: None,
            energy_level: None,
            performance_score: None,
            recovery_hours: None,
            start_date: now,
            source: EntrySource::QuickEntry,
            confidence_score: confidence,
            notes: data.get("notes").and_then(Value::as_str).map(str::to_string),
        })),
        "workout" => {
            let exercises: Vec<ExerciseSet> = data
                .get("exercises")
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default();
            let volume_load = compute_volume_load(&exercises);
            let muscle_groups = infer_muscle_groups(&exercises);

            Ok(ClassifiedEntry::Workout(WorkoutEntry {
                id: Uuid::new_v4(),
                user_id: user_id.to_string(),
                notes: data.get("notes").and_then(Value::as_str).map(str::to_string),
                duration_minutes: field_f32(&data, "duration_minutes") as i32,
                exercises: serde_json::to_value(&exercises).unwrap_or(Value::Null),
                volume_load,
                muscle_groups,
                rpe: None,
                mood: None,
                progressive_overload_status: None,
                recovery_hours: None,
                started_at: now,
                completed_at: Some(now),
                source: EntrySource::QuickEntry,
                confidence_score: confidence,
            }))
        }
        "measurement" => Ok(ClassifiedEntry::Measurement(MeasurementEntry {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            weight: data.get("weight_lbs").and_then(Value::as_f64).map(|lbs| (lbs * 0.453_592) as f32),
            body_fat_pct: data.get("body_fat_pct").and_then(Value::as_f64).map(|v| v as f32),
            measurements: data.get("measurements").cloned().unwrap_or(Value::Null),
            measured_at: now,
            source: EntrySource::QuickEntry,
            confidence_score: confidence,
            notes: None,
        })),
        "note" => Ok(ClassifiedEntry::Note(NoteEntry {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            title: data.get("title").and_then(Value::as_str).map(str::to_string),
            content: field_str(&data, "content"),
            category: data.get("category").and_then(Value::as_str).map(str::to_string),
            sentiment: None,
            sentiment_score: None,
            tags: data
                .get("tags")
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default(),
            logged_at: now,
            source: EntrySource::QuickEntry,
            confidence_score: confidence,
        })),
        other => Err(CoreError::invalid_input(format!("unrecognized entry type '{other}' for text '{raw_text}'"))),
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;

    #[test]
    fn forced_type_confirm_is_not_degraded_by_low_confidence() {
        let classification = Classification {
            extracted_text: "had a protein shake".to_string(),
            entry_type: "meal".to_string(),
            confidence: 1.0,
            data: serde_json::json!({"meal_name": "protein shake", "calories": 200.0}),
        };

        let pipeline_confirm = build_entry("u1", "meal", 1.0, classification.data.clone(), &classification.extracted_text);
        assert!(matches!(pipeline_confirm, Ok(ClassifiedEntry::Meal(_))));
    }

    #[test]
    fn low_confidence_unforced_degrades_to_unclassified_note() {
        let note = unclassified_note("u1", "mumbled something", 0.2);
        assert_eq!(note.tags, vec!["unclassified".to_string()]);
        assert!(note.confidence_score < MIN_CLASSIFICATION_CONFIDENCE);
    }

    #[test]
    fn min_classification_confidence_matches_threshold() {
        assert!((MIN_CLASSIFICATION_CONFIDENCE - 0.4).abs() < f32::EPSILON);
    }

    struct StubObjectStore;

    #[async_trait]
    impl ObjectStore for StubObjectStore {
        async fn upload(&self, key: &str, _content_type: &str, _bytes: Vec<u8>) -> CoreResult<String> {
            Ok(format!("https://cdn.example.com/{key}"))
        }

        async fn fetch(&self, _key: &str) -> CoreResult<Vec<u8>> {
            unimplemented!("not exercised by pipeline tests")
        }
    }

    #[tokio::test]
    async fn confirm_uploads_meal_image_and_emits_a_separate_vectorize_image_task() {
        let pipeline =
            QuickEntryPipeline::new(Arc::new(ModelRouter::new()), None, None, Some(Arc::new(StubObjectStore)));

        let classification = Classification {
            extracted_text: "chicken and rice photo".to_string(),
            entry_type: "meal".to_string(),
            confidence: 0.9,
            data: serde_json::json!({"meal_name": "chicken and rice", "calories": 500.0}),
        };

        let (entry, tasks) = pipeline.confirm("u1", classification, Some(b"fake-jpeg-bytes")).await.unwrap();

        let meal = match entry {
            ClassifiedEntry::Meal(meal) => meal,
            other => panic!("expected a meal entry, got {other:?}"),
        };
        assert!(meal.image_url.as_ref().unwrap().starts_with("https://cdn.example.com/quick-entry/u1/"));

        assert_eq!(tasks.len(), 2);
        assert!(matches!(tasks[0], Task::VectorizeEntry { .. }));
        match &tasks[1] {
            Task::VectorizeImage { source_type, image_bytes, .. } => {
                assert_eq!(source_type, "meal");
                assert_eq!(image_bytes, b"fake-jpeg-bytes");
            }
            other => panic!("expected a VectorizeImage task, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn confirm_without_image_bytes_emits_only_the_text_vectorization_task() {
        let pipeline =
            QuickEntryPipeline::new(Arc::new(ModelRouter::new()), None, None, Some(Arc::new(StubObjectStore)));

        let classification = Classification {
            extracted_text: "went for a run".to_string(),
            entry_type: "activity".to_string(),
            confidence: 0.9,
            data: serde_json::json!({"activity_name": "run", "duration_minutes": 30.0}),
        };

        let (_, tasks) = pipeline.confirm("u1", classification, None).await.unwrap();
        assert_eq!(tasks.len(), 1);
    }
}
