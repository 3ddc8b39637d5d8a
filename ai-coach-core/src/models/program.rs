use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, Type};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "program_status", rename_all = "snake_case")]
pub enum ProgramStatus {
    Active,
    Completed,
    Abandoned,
}

/// A generated, event-anchored recommendation plan produced by C9. One
/// `Program` spans a date range and owns an ordered set of `ProgramDay`s.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Program {
    pub id: Uuid,
    pub user_id: String,
    pub event_id: Option<Uuid>,
    pub status: ProgramStatus,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProgramDay {
    pub id: Uuid,
    pub program_id: Uuid,
    pub day_date: NaiveDate,
    pub periodization_phase: String,
    pub target_calories: Option<i32>,
    pub target_protein_g: Option<i32>,
    pub target_carbs_g: Option<i32>,
    pub target_fat_g: Option<i32>,
    pub planned_workout: Option<Value>,
    pub rationale: String,
}
