use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, Type};
use std::collections::HashSet;
use uuid::Uuid;

/// The closed set of quick-entry variants a classified entry can resolve to.
/// `Unknown` only ever appears transiently during classification (§4.6); it is
/// never persisted as its own variant — low-confidence results are persisted
/// as a `Note` tagged `unclassified`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "entry_type", rename_all = "snake_case")]
pub enum EntryType {
    Meal,
    Activity,
    Workout,
    Measurement,
    Note,
}

impl EntryType {
    /// The `source_type` an embedding row carries when it backs this entry
    /// type, per the `entry_type -> source_type` mapping in `spec.md` §4.6.
    pub fn embedding_source_type(self) -> &'static str {
        match self {
            EntryType::Meal => "meal",
            EntryType::Activity => "activity",
            EntryType::Workout => "workout",
            EntryType::Note => "voice_note",
            EntryType::Measurement => "progress_photo",
        }
    }

    /// The lowercase wire name classification responses and manual-override
    /// callers use, matching `#[sqlx(rename_all = "snake_case")]`.
    pub fn as_str(self) -> &'static str {
        match self {
            EntryType::Meal => "meal",
            EntryType::Activity => "activity",
            EntryType::Workout => "workout",
            EntryType::Measurement => "measurement",
            EntryType::Note => "note",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "entry_source", rename_all = "snake_case")]
pub enum EntrySource {
    QuickEntry,
    Manual,
    Import,
}

/// Fields common to every logged entry variant, per `spec.md` §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryCommon {
    pub id: Uuid,
    pub user_id: String,
    pub logged_at: DateTime<Utc>,
    pub source: EntrySource,
    pub confidence_score: f32,
    pub tags: HashSet<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MealEntry {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub meal_type: String,
    pub calories: f32,
    pub protein_g: f32,
    pub carbs_g: f32,
    pub fat_g: f32,
    pub fiber_g: f32,
    pub sugar_g: f32,
    pub sodium_mg: f32,
    pub foods: Value,
    pub image_url: Option<String>,
    pub confidence_score: f32,
    pub meal_quality_score: Option<f32>,
    pub macro_balance_score: Option<f32>,
    pub adherence_to_goals: Option<f32>,
    pub enrichment_tags: Vec<String>,
    pub logged_at: DateTime<Utc>,
    pub source: EntrySource,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ActivityEntry {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub activity_type: String,
    pub sport_type: String,
    pub elapsed_time_seconds: i32,
    pub moving_time_seconds: i32,
    pub distance_meters: Option<f32>,
    pub calories: Option<f32>,
    pub perceived_exertion: Option<i16>,
    pub mood: Option<String>,
    pub energy_level: Option<i16>,
    pub performance_score: Option<f32>,
    pub recovery_hours: Option<f32>,
    pub start_date: DateTime<Utc>,
    pub source: EntrySource,
    pub confidence_score: f32,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkoutEntry {
    pub id: Uuid,
    pub user_id: String,
    pub notes: Option<String>,
    pub duration_minutes: i32,
    pub exercises: Value,
    pub volume_load: f32,
    pub muscle_groups: Vec<String>,
    pub rpe: Option<i16>,
    pub mood: Option<String>,
    pub progressive_overload_status: Option<String>,
    pub recovery_hours: Option<f32>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub source: EntrySource,
    pub confidence_score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MeasurementEntry {
    pub id: Uuid,
    pub user_id: String,
    pub weight: Option<f32>,
    pub body_fat_pct: Option<f32>,
    pub measurements: Value,
    pub measured_at: DateTime<Utc>,
    pub source: EntrySource,
    pub confidence_score: f32,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NoteEntry {
    pub id: Uuid,
    pub user_id: String,
    pub title: Option<String>,
    pub content: String,
    pub category: Option<String>,
    pub sentiment: Option<String>,
    pub sentiment_score: Option<f32>,
    pub tags: Vec<String>,
    pub logged_at: DateTime<Utc>,
    pub source: EntrySource,
    pub confidence_score: f32,
}

/// A single food line item within a parsed meal, carried flat on the meal row
/// (§2 of `SPEC_FULL.md` — no foods-lookup join; that table is out of scope).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoodItem {
    pub name: String,
    pub quantity: Option<String>,
    pub calories: f32,
    pub protein_g: f32,
    pub carbs_g: f32,
    pub fat_g: f32,
}

/// An entry set of strength-exercise sets, used to derive `volume_load`
/// and `muscle_groups` before persistence (`spec.md` §4.6 "Derived quantities").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExerciseSet {
    pub exercise_name: String,
    pub sets: u32,
    pub reps: u32,
    pub weight_kg: f32,
}

/// Deterministically derive `volume_load = sum(sets * reps * weight)`.
pub fn compute_volume_load(exercises: &[ExerciseSet]) -> f32 {
    exercises
        .iter()
        .map(|e| e.sets as f32 * e.reps as f32 * e.weight_kg)
        .sum()
}

/// Substring-rule muscle group inference, per `spec.md` §4.6.
pub fn infer_muscle_groups(exercises: &[ExerciseSet]) -> Vec<String> {
    const RULES: &[(&str, &[&str])] = &[
        ("chest", &["bench", "chest", "fly", "push-up", "pushup", "dip"]),
        ("legs", &["squat", "leg", "lunge", "calf", "deadlift"]),
        ("back", &["row", "pulldown", "pull-up", "pullup", "deadlift"]),
        ("shoulders", &["shoulder", "press", "raise", "delt"]),
        ("arms", &["curl", "tricep", "bicep", "extension"]),
    ];

    let mut groups = HashSet::new();
    for exercise in exercises {
        let lowered = exercise.exercise_name.to_lowercase();
        for (group, needles) in RULES {
            if needles.iter().any(|needle| lowered.contains(needle)) {
                groups.insert(group.to_string());
            }
        }
    }

    let mut result: Vec<String> = groups.into_iter().collect();
    result.sort();
    result
}
