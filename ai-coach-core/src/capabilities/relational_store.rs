use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::CoreResult;
use crate::models::consultation::{ConsultationExtraction, ConsultationMessage, ConsultationSession, SpecialistType};
use crate::models::embedding::PendingEmbeddingJob;
use crate::models::entry::{ActivityEntry, MealEntry, MeasurementEntry, NoteEntry, WorkoutEntry};
use crate::models::event::Event;
use crate::models::program::ProgramDay;
use crate::models::recommendation::{Recommendation, RecommendationStatus};

/// Per-entity persistence the core reads/writes, per `spec.md` §6
/// ("RelationalStore exposing per-entity table operations with filters; the
/// core uses no joins that cross user partitions"). Implementations own the
/// invariants that can't be expressed purely in-process because they depend
/// on what else is already stored: at most one active consultation session
/// per `(user_id, specialist_type)` (§8 invariant 2) and at most one
/// `is_primary_goal` event per user (§3, §8 invariant 4) both require an
/// atomic check against existing rows, so the trait documents those as
/// contractual obligations on the implementation rather than re-deriving
/// them in the stateless services that call it.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    async fn insert_meal(&self, entry: &MealEntry) -> CoreResult<Uuid>;
    async fn insert_activity(&self, entry: &ActivityEntry) -> CoreResult<Uuid>;
    async fn insert_workout(&self, entry: &WorkoutEntry) -> CoreResult<Uuid>;
    async fn insert_measurement(&self, entry: &MeasurementEntry) -> CoreResult<Uuid>;
    async fn insert_note(&self, entry: &NoteEntry) -> CoreResult<Uuid>;

    /// Resume the caller's already-active session for `(user_id,
    /// specialist_type)` if one exists; otherwise insert `fresh` and return
    /// it unchanged. Must run as a single atomic check-then-insert so two
    /// concurrent `start` calls for the same pair can't both insert an
    /// active session (§8 invariant 2; `SPEC_FULL.md` §3 Open Question 2).
    async fn start_or_resume_session(
        &self,
        user_id: &str,
        specialist_type: SpecialistType,
        fresh: ConsultationSession,
    ) -> CoreResult<ConsultationSession>;

    async fn save_session(&self, session: &ConsultationSession) -> CoreResult<()>;

    /// Look up a session by id, for callers (e.g. the background worker's
    /// `update_conversation_analytics`/`summarize_conversation` tasks, §4.10)
    /// that only have the id and need the row to mutate and save back.
    async fn session_by_id(&self, session_id: Uuid) -> CoreResult<Option<ConsultationSession>>;

    async fn append_message(&self, message: &ConsultationMessage) -> CoreResult<()>;
    async fn append_extractions(&self, extractions: &[ConsultationExtraction]) -> CoreResult<()>;
    async fn recent_messages(&self, session_id: Uuid, limit: i64) -> CoreResult<Vec<ConsultationMessage>>;
    async fn extractions_for_session(&self, session_id: Uuid) -> CoreResult<Vec<ConsultationExtraction>>;

    /// Insert `event`. If `event.is_primary_goal`, the implementation must
    /// first clear `is_primary_goal` on every other event owned by the same
    /// user, in the same transaction, so at most one ever carries it (§3,
    /// §8 invariant 4).
    async fn insert_event(&self, event: &Event) -> CoreResult<Uuid>;
    async fn upcoming_events(&self, user_id: &str, as_of: NaiveDate, within_days: i64) -> CoreResult<Vec<Event>>;

    /// The active program's scheduled day for `date`, if any — the input
    /// `RecommendationEngine::workout_recommendation` (§4.9) needs to choose
    /// between a program day, a generic training day, and rest.
    async fn active_program_day(&self, user_id: &str, date: NaiveDate) -> CoreResult<Option<ProgramDay>>;

    async fn insert_recommendation(&self, recommendation: &Recommendation) -> CoreResult<Uuid>;

    /// Apply `new_status` only if the row's current status isn't already
    /// terminal; returns whether the update actually applied, so a caller
    /// can distinguish "already in a terminal state" from "row not found"
    /// (§3, §8 invariant 1: terminal statuses are immutable).
    async fn update_recommendation_status_if_not_terminal(
        &self,
        id: Uuid,
        new_status: RecommendationStatus,
    ) -> CoreResult<bool>;

    async fn pending_recommendations_for_date(&self, user_id: &str, date: NaiveDate) -> CoreResult<Vec<Recommendation>>;

    /// The user's `limit` most recent meals, newest first — backs the
    /// background worker's `warm_user_cache` prefetch and
    /// `generate_summaries_task` aggregation (`spec.md` §4.10).
    async fn recent_meals(&self, user_id: &str, limit: i64) -> CoreResult<Vec<MealEntry>>;

    /// The user's `limit` most recent activities, newest first — same
    /// callers as [`recent_meals`](Self::recent_meals).
    async fn recent_activities(&self, user_id: &str, limit: i64) -> CoreResult<Vec<ActivityEntry>>;

    /// Atomically claim (and remove) up to `limit` rows from the
    /// server-side embedding queue `spec.md` §4.10's `process_embeddings_
    /// task` polls. Claiming removes the rows so two concurrent drains
    /// can't double-embed the same one; a caller that fails to embed a
    /// claimed row is responsible for re-queuing it.
    async fn claim_pending_embedding_jobs(&self, limit: i64) -> CoreResult<Vec<PendingEmbeddingJob>>;
}
