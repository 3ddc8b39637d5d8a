use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::capabilities::RelationalStore;
use crate::error::{CoreError, CoreResult};
use crate::models::consultation::{ConsultationExtraction, ConsultationMessage, ConsultationSession, SpecialistType};
use crate::models::embedding::PendingEmbeddingJob;
use crate::models::entry::{ActivityEntry, MealEntry, MeasurementEntry, NoteEntry, WorkoutEntry};
use crate::models::event::Event;
use crate::models::program::ProgramDay;
use crate::models::recommendation::{Recommendation, RecommendationStatus};

/// Postgres-backed [`RelationalStore`], grounded on the direct
/// `PgPool` + runtime `query_as::<_, T>` style the teacher uses in
/// `auth/service.rs` (rather than the compile-time `query_as!` macros it
/// uses elsewhere) — this crate has no `DATABASE_URL` available at build
/// time to check macros against, the same situation the teacher's own
/// `auth/service.rs` is in for its hand-rolled queries.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        PostgresStore { pool }
    }
}

#[async_trait]
impl RelationalStore for PostgresStore {
    async fn insert_meal(&self, entry: &MealEntry) -> CoreResult<Uuid> {
        let row: (Uuid,) = sqlx::query_as(
            "INSERT INTO meals (
                id, user_id, name, meal_type, calories, protein_g, carbs_g, fat_g, fiber_g,
                sugar_g, sodium_mg, foods, image_url, confidence_score, meal_quality_score,
                macro_balance_score, adherence_to_goals, enrichment_tags, logged_at, source, notes
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)
            RETURNING id",
        )
        .bind(entry.id)
        .bind(&entry.user_id)
        .bind(&entry.name)
        .bind(&entry.meal_type)
        .bind(entry.calories)
        .bind(entry.protein_g)
        .bind(entry.carbs_g)
        .bind(entry.fat_g)
        .bind(entry.fiber_g)
        .bind(entry.sugar_g)
        .bind(entry.sodium_mg)
        .bind(&entry.foods)
        .bind(&entry.image_url)
        .bind(entry.confidence_score)
        .bind(entry.meal_quality_score)
        .bind(entry.macro_balance_score)
        .bind(entry.adherence_to_goals)
        .bind(&entry.enrichment_tags)
        .bind(entry.logged_at)
        .bind(entry.source)
        .bind(&entry.notes)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    async fn insert_activity(&self, entry: &ActivityEntry) -> CoreResult<Uuid> {
        let row: (Uuid,) = sqlx::query_as(
            "INSERT INTO activities (
                id, user_id, name, activity_type, sport_type, elapsed_time_seconds, moving_time_seconds,
                distance_meters, calories, perceived_exertion, mood, energy_level, performance_score,
                recovery_hours, start_date, source, confidence_score, notes
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            RETURNING id",
        )
        .bind(entry.id)
        .bind(&entry.user_id)
        .bind(&entry.name)
        .bind(&entry.activity_type)
        .bind(&entry.sport_type)
        .bind(entry.elapsed_time_seconds)
        .bind(entry.moving_time_seconds)
        .bind(entry.distance_meters)
        .bind(entry.calories)
        .bind(entry.perceived_exertion)
        .bind(&entry.mood)
        .bind(entry.energy_level)
        .bind(entry.performance_score)
        .bind(entry.recovery_hours)
        .bind(entry.start_date)
        .bind(entry.source)
        .bind(entry.confidence_score)
        .bind(&entry.notes)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    async fn insert_workout(&self, entry: &WorkoutEntry) -> CoreResult<Uuid> {
        let row: (Uuid,) = sqlx::query_as(
            "INSERT INTO workouts (
                id, user_id, notes, duration_minutes, exercises, volume_load, muscle_groups, rpe, mood,
                progressive_overload_status, recovery_hours, started_at, completed_at, source, confidence_score
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING id",
        )
        .bind(entry.id)
        .bind(&entry.user_id)
        .bind(&entry.notes)
        .bind(entry.duration_minutes)
        .bind(&entry.exercises)
        .bind(entry.volume_load)
        .bind(&entry.muscle_groups)
        .bind(entry.rpe)
        .bind(&entry.mood)
        .bind(&entry.progressive_overload_status)
        .bind(entry.recovery_hours)
        .bind(entry.started_at)
        .bind(entry.completed_at)
        .bind(entry.source)
        .bind(entry.confidence_score)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    async fn insert_measurement(&self, entry: &MeasurementEntry) -> CoreResult<Uuid> {
        let row: (Uuid,) = sqlx::query_as(
            "INSERT INTO measurements (
                id, user_id, weight, body_fat_pct, measurements, measured_at, source, confidence_score, notes
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id",
        )
        .bind(entry.id)
        .bind(&entry.user_id)
        .bind(entry.weight)
        .bind(entry.body_fat_pct)
        .bind(&entry.measurements)
        .bind(entry.measured_at)
        .bind(entry.source)
        .bind(entry.confidence_score)
        .bind(&entry.notes)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    async fn insert_note(&self, entry: &NoteEntry) -> CoreResult<Uuid> {
        let row: (Uuid,) = sqlx::query_as(
            "INSERT INTO notes (
                id, user_id, title, content, category, sentiment, sentiment_score, tags, logged_at,
                source, confidence_score
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id",
        )
        .bind(entry.id)
        .bind(&entry.user_id)
        .bind(&entry.title)
        .bind(&entry.content)
        .bind(&entry.category)
        .bind(&entry.sentiment)
        .bind(entry.sentiment_score)
        .bind(&entry.tags)
        .bind(entry.logged_at)
        .bind(entry.source)
        .bind(entry.confidence_score)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    async fn start_or_resume_session(
        &self,
        user_id: &str,
        specialist_type: SpecialistType,
        fresh: ConsultationSession,
    ) -> CoreResult<ConsultationSession> {
        let mut tx = self.pool.begin().await?;

        // Row-level lock so two concurrent `start` calls for the same pair
        // can't both see "no active session" and both insert one.
        let existing: Option<ConsultationSession> = sqlx::query_as(
            "SELECT id, user_id, specialist_type, status, current_stage_index, progress_percentage,
                    total_messages, session_metadata, started_at, completed_at
             FROM consultation_sessions
             WHERE user_id = $1 AND specialist_type = $2 AND status = 'active'
             FOR UPDATE",
        )
        .bind(user_id)
        .bind(specialist_type)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(session) = existing {
            tx.commit().await?;
            return Ok(session);
        }

        let inserted: ConsultationSession = sqlx::query_as(
            "INSERT INTO consultation_sessions (
                id, user_id, specialist_type, status, current_stage_index, progress_percentage,
                total_messages, session_metadata, started_at, completed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id, user_id, specialist_type, status, current_stage_index, progress_percentage,
                      total_messages, session_metadata, started_at, completed_at",
        )
        .bind(fresh.id)
        .bind(&fresh.user_id)
        .bind(fresh.specialist_type)
        .bind(fresh.status)
        .bind(fresh.current_stage_index)
        .bind(fresh.progress_percentage)
        .bind(fresh.total_messages)
        .bind(&fresh.session_metadata)
        .bind(fresh.started_at)
        .bind(fresh.completed_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(inserted)
    }

    async fn save_session(&self, session: &ConsultationSession) -> CoreResult<()> {
        sqlx::query(
            "UPDATE consultation_sessions
             SET status = $2, current_stage_index = $3, progress_percentage = $4, total_messages = $5,
                 session_metadata = $6, completed_at = $7
             WHERE id = $1",
        )
        .bind(session.id)
        .bind(session.status)
        .bind(session.current_stage_index)
        .bind(session.progress_percentage)
        .bind(session.total_messages)
        .bind(&session.session_metadata)
        .bind(session.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn session_by_id(&self, session_id: Uuid) -> CoreResult<Option<ConsultationSession>> {
        let session = sqlx::query_as(
            "SELECT id, user_id, specialist_type, status, current_stage_index, progress_percentage,
                    total_messages, session_metadata, started_at, completed_at
             FROM consultation_sessions
             WHERE id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn append_message(&self, message: &ConsultationMessage) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO consultation_messages (id, session_id, role, content, tokens_used, cost_usd, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(message.id)
        .bind(message.session_id)
        .bind(message.role)
        .bind(&message.content)
        .bind(message.tokens_used)
        .bind(message.cost_usd)
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_extractions(&self, extractions: &[ConsultationExtraction]) -> CoreResult<()> {
        for extraction in extractions {
            sqlx::query(
                "INSERT INTO consultation_extractions
                    (id, session_id, user_id, category, data, confidence_score, source_message, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(extraction.id)
            .bind(extraction.session_id)
            .bind(&extraction.user_id)
            .bind(extraction.category)
            .bind(&extraction.data)
            .bind(extraction.confidence_score)
            .bind(&extraction.source_message)
            .bind(extraction.created_at)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn recent_messages(&self, session_id: Uuid, limit: i64) -> CoreResult<Vec<ConsultationMessage>> {
        let mut messages: Vec<ConsultationMessage> = sqlx::query_as(
            "SELECT id, session_id, role, content, tokens_used, cost_usd, created_at
             FROM consultation_messages
             WHERE session_id = $1
             ORDER BY created_at DESC
             LIMIT $2",
        )
        .bind(session_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        messages.reverse();
        Ok(messages)
    }

    async fn extractions_for_session(&self, session_id: Uuid) -> CoreResult<Vec<ConsultationExtraction>> {
        let extractions = sqlx::query_as(
            "SELECT id, session_id, user_id, category, data, confidence_score, source_message, created_at
             FROM consultation_extractions
             WHERE session_id = $1
             ORDER BY created_at ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(extractions)
    }

    async fn insert_event(&self, event: &Event) -> CoreResult<Uuid> {
        if !event.validate_milestones() {
            return Err(CoreError::invalid_input(
                "event milestone dates must satisfy training_start_date <= peak_week_date <= taper_start_date <= date",
            ));
        }

        let mut tx = self.pool.begin().await?;

        if event.is_primary_goal {
            sqlx::query("UPDATE events SET is_primary_goal = false WHERE user_id = $1 AND is_primary_goal = true")
                .bind(&event.user_id)
                .execute(&mut *tx)
                .await?;
        }

        let row: (Uuid,) = sqlx::query_as(
            "INSERT INTO events (
                id, user_id, name, event_type, date, training_start_date, peak_week_date, taper_start_date,
                is_primary_goal, status, linked_program_id, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING id",
        )
        .bind(event.id)
        .bind(&event.user_id)
        .bind(&event.name)
        .bind(event.event_type)
        .bind(event.date)
        .bind(event.training_start_date)
        .bind(event.peak_week_date)
        .bind(event.taper_start_date)
        .bind(event.is_primary_goal)
        .bind(event.status)
        .bind(event.linked_program_id)
        .bind(event.created_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.0)
    }

    async fn upcoming_events(&self, user_id: &str, as_of: NaiveDate, within_days: i64) -> CoreResult<Vec<Event>> {
        let horizon = as_of + chrono::Duration::days(within_days);
        let events = sqlx::query_as(
            "SELECT id, user_id, name, event_type, date, training_start_date, peak_week_date, taper_start_date,
                    is_primary_goal, status, linked_program_id, created_at
             FROM events
             WHERE user_id = $1 AND date >= $2 AND date <= $3 AND status != 'abandoned'
             ORDER BY date ASC",
        )
        .bind(user_id)
        .bind(as_of)
        .bind(horizon)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    async fn active_program_day(&self, user_id: &str, date: NaiveDate) -> CoreResult<Option<ProgramDay>> {
        let day: Option<ProgramDay> = sqlx::query_as(
            "SELECT d.id, d.program_id, d.day_date, d.periodization_phase, d.target_calories,
                    d.target_protein_g, d.target_carbs_g, d.target_fat_g, d.planned_workout, d.rationale
             FROM program_days d
             JOIN programs p ON p.id = d.program_id
             WHERE p.user_id = $1 AND p.status = 'active' AND d.day_date = $2",
        )
        .bind(user_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;
        Ok(day)
    }

    async fn insert_recommendation(&self, recommendation: &Recommendation) -> CoreResult<Uuid> {
        let row: (Uuid,) = sqlx::query_as(
            "INSERT INTO recommendations (
                id, user_id, recommendation_date, recommendation_time, recommendation_type, content,
                reasoning, priority, status, based_on_data, expires_at, feedback, feedback_rating, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING id",
        )
        .bind(recommendation.id)
        .bind(&recommendation.user_id)
        .bind(recommendation.recommendation_date)
        .bind(recommendation.recommendation_time)
        .bind(recommendation.recommendation_type)
        .bind(&recommendation.content)
        .bind(&recommendation.reasoning)
        .bind(recommendation.priority)
        .bind(recommendation.status)
        .bind(&recommendation.based_on_data)
        .bind(recommendation.expires_at)
        .bind(&recommendation.feedback)
        .bind(recommendation.feedback_rating)
        .bind(recommendation.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    async fn update_recommendation_status_if_not_terminal(
        &self,
        id: Uuid,
        new_status: RecommendationStatus,
    ) -> CoreResult<bool> {
        let result = sqlx::query(
            "UPDATE recommendations
             SET status = $2
             WHERE id = $1 AND status NOT IN ('completed', 'rejected', 'expired')",
        )
        .bind(id)
        .bind(new_status)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn pending_recommendations_for_date(&self, user_id: &str, date: NaiveDate) -> CoreResult<Vec<Recommendation>> {
        let recommendations = sqlx::query_as(
            "SELECT id, user_id, recommendation_date, recommendation_time, recommendation_type, content,
                    reasoning, priority, status, based_on_data, expires_at, feedback, feedback_rating, created_at
             FROM recommendations
             WHERE user_id = $1 AND recommendation_date = $2 AND status = 'pending'",
        )
        .bind(user_id)
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(recommendations)
    }

    async fn recent_meals(&self, user_id: &str, limit: i64) -> CoreResult<Vec<MealEntry>> {
        let meals = sqlx::query_as(
            "SELECT id, user_id, name, meal_type, calories, protein_g, carbs_g, fat_g, fiber_g,
                    sugar_g, sodium_mg, foods, image_url, confidence_score, meal_quality_score,
                    macro_balance_score, adherence_to_goals, enrichment_tags, logged_at, source, notes
             FROM meals
             WHERE user_id = $1
             ORDER BY logged_at DESC
             LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(meals)
    }

    async fn recent_activities(&self, user_id: &str, limit: i64) -> CoreResult<Vec<ActivityEntry>> {
        let activities = sqlx::query_as(
            "SELECT id, user_id, name, activity_type, sport_type, elapsed_time_seconds, moving_time_seconds,
                    distance_meters, calories, perceived_exertion, mood, energy_level, performance_score,
                    recovery_hours, start_date, source, confidence_score, notes
             FROM activities
             WHERE user_id = $1
             ORDER BY start_date DESC
             LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(activities)
    }

    async fn claim_pending_embedding_jobs(&self, limit: i64) -> CoreResult<Vec<PendingEmbeddingJob>> {
        let jobs = sqlx::query_as(
            "DELETE FROM pending_embedding_jobs
             WHERE id IN (
                 SELECT id FROM pending_embedding_jobs
                 ORDER BY created_at ASC
                 LIMIT $1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING id, user_id, source_type, source_id, text, created_at",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }
}
