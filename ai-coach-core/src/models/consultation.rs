use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, Type};
use uuid::Uuid;

/// The five specialist dialogue types from `spec.md` §4.8, each carrying its
/// own system prompt and stage list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "specialist_type", rename_all = "snake_case")]
pub enum SpecialistType {
    Nutritionist,
    Trainer,
    Physiotherapist,
    SportsPsychologist,
    UnifiedCoach,
}

impl SpecialistType {
    /// The ordered stage names a session of this specialist progresses
    /// through, grounded on the stage tables in the consultation engine.
    pub fn stages(self) -> &'static [&'static str] {
        match self {
            SpecialistType::Nutritionist => &[
                "introduction",
                "current_habits",
                "goals",
                "dietary_restrictions",
                "lifestyle_factors",
                "preferences",
                "wrap_up",
            ],
            SpecialistType::Trainer => &[
                "introduction",
                "training_history",
                "current_routine",
                "goals",
                "constraints",
                "equipment_access",
                "wrap_up",
            ],
            SpecialistType::Physiotherapist => &[
                "introduction",
                "current_issues",
                "injury_history",
                "movement_assessment",
                "recovery_patterns",
                "goals",
                "wrap_up",
            ],
            SpecialistType::SportsPsychologist => &[
                "introduction",
                "performance_mindset",
                "mental_barriers",
                "motivation_factors",
                "coping_strategies",
                "goals",
                "wrap_up",
            ],
            SpecialistType::UnifiedCoach => &[
                "introduction",
                "primary_goals",
                "current_state",
                "limitations_preferences",
                "lifestyle_factors",
                "success_metrics",
                "wrap_up",
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "consultation_status", rename_all = "snake_case")]
pub enum ConsultationStatus {
    Active,
    Completed,
    Abandoned,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ConsultationSession {
    pub id: Uuid,
    pub user_id: String,
    pub specialist_type: SpecialistType,
    pub status: ConsultationStatus,
    pub current_stage_index: i32,
    pub progress_percentage: i32,
    pub total_messages: i32,
    pub session_metadata: Value,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ConsultationSession {
    pub fn current_stage(&self) -> &'static str {
        let stages = self.specialist_type.stages();
        stages
            .get(self.current_stage_index as usize)
            .copied()
            .unwrap_or(stages[stages.len() - 1])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "consultation_message_role", rename_all = "snake_case")]
pub enum ConsultationMessageRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ConsultationMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: ConsultationMessageRole,
    pub content: String,
    pub tokens_used: i32,
    pub cost_usd: f64,
    pub created_at: DateTime<Utc>,
}

/// The closed set of categories a completed consultation can extract
/// structured facts into, per `spec.md` §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "extraction_category", rename_all = "snake_case")]
pub enum ExtractionCategory {
    HealthHistory,
    EatingPatterns,
    Measurements,
    Goals,
    Preferences,
    Lifestyle,
    Psychology,
}

/// `(session_id, user_id, category, data, confidence_score, source_message?)`
/// per `spec.md` §3. Append-only; the latest row per category wins when a
/// session's extractions are collapsed into a summary (§4.8 `complete`).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ConsultationExtraction {
    pub id: Uuid,
    pub session_id: Uuid,
    pub user_id: String,
    pub category: ExtractionCategory,
    pub data: Value,
    pub confidence_score: f32,
    pub source_message: Option<String>,
    pub created_at: DateTime<Utc>,
}
