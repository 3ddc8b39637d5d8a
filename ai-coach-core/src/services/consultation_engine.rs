use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use crate::capabilities::ChatMessage;
use crate::error::CoreResult;
use crate::models::consultation::{
    ConsultationExtraction, ConsultationSession, ConsultationStatus, ExtractionCategory, SpecialistType,
};
use crate::models::recommendation::Recommendation;
use crate::services::model_router::{ModelRouter, TaskType};
use crate::services::nutrition_calculator::{ActivityLevel, BiologicalSex, GoalType, NutritionCalculator, NutritionPlan};
use crate::services::prompt_security::sanitize_for_prompt;

/// Every third user message advances the session to the next stage, per the
/// original consultation service's pacing heuristic — frequent enough that
/// a session doesn't stall, sparse enough that a specialist has room to
/// follow up before moving on.
const MESSAGES_PER_STAGE: i32 = 3;

/// Conservative default confidence for extractions — the model isn't asked
/// to self-rate, so every non-empty extraction gets the same cautious score.
const DEFAULT_EXTRACTION_CONFIDENCE: f32 = 0.85;

fn specialist_system_prompt(specialist_type: SpecialistType) -> &'static str {
    match specialist_type {
        SpecialistType::Nutritionist => {
            "You are a registered-dietitian-trained nutrition coach. Ask one question at a time, \
             build toward a complete picture of the user's eating habits and goals, and never give \
             medical advice — refer out for anything clinical."
        }
        SpecialistType::Trainer => {
            "You are an experienced strength and conditioning coach. Ask one question at a time to \
             understand the user's training history, current routine, and goals before recommending \
             anything."
        }
        SpecialistType::Physiotherapist => {
            "You are a physiotherapist gathering an intake history. Ask one question at a time about \
             current issues, injury history, and movement patterns. Flag anything that sounds like it \
             needs in-person evaluation rather than diagnosing remotely."
        }
        SpecialistType::SportsPsychologist => {
            "You are a sports psychologist helping an athlete understand their mindset. Ask one \
             question at a time about mental barriers, motivation, and coping strategies."
        }
        SpecialistType::UnifiedCoach => {
            "You are a generalist fitness coach covering nutrition, training, and lifestyle together. \
             Ask one question at a time to build a full picture of the user's goals and constraints."
        }
    }
}

fn initial_question(specialist_type: SpecialistType) -> &'static str {
    match specialist_type {
        SpecialistType::Nutritionist => "To start, what does a typical day of eating look like for you?",
        SpecialistType::Trainer => "Let's start with your training background — what does your current routine look like?",
        SpecialistType::Physiotherapist => "What brings you in today — any current pain or movement issues I should know about?",
        SpecialistType::SportsPsychologist => "What's on your mind when you think about your performance lately?",
        SpecialistType::UnifiedCoach => "What's the main thing you're hoping to work on together?",
    }
}

fn wrap_up_message(specialist_type: SpecialistType) -> String {
    match specialist_type {
        SpecialistType::Nutritionist => {
            "Thanks for walking me through your eating habits and goals — I have what I need to put \
             together your nutrition targets."
        }
        SpecialistType::Trainer => {
            "That gives me a clear picture of your training background and goals — I'll use this to \
             shape your program."
        }
        SpecialistType::Physiotherapist => {
            "Thanks for the detail on your history and movement patterns — I'll factor this into any \
             recommendations going forward."
        }
        SpecialistType::SportsPsychologist => {
            "That's a helpful picture of your mindset and motivation — I'll keep it in mind as we work \
             together."
        }
        SpecialistType::UnifiedCoach => {
            "That covers everything I needed for a full picture — let's put it to work."
        }
    }
    .to_string()
}

/// The closed set of extraction categories a specialist's intake is allowed
/// to populate, per `spec.md` §4.8's "specialist-specific extraction schema".
fn extraction_categories_for(specialist_type: SpecialistType) -> &'static [ExtractionCategory] {
    use ExtractionCategory::*;
    match specialist_type {
        SpecialistType::Nutritionist => &[EatingPatterns, Measurements, Goals, Preferences],
        SpecialistType::Trainer => &[Goals, Preferences, Lifestyle, Measurements],
        SpecialistType::Physiotherapist => &[HealthHistory, Lifestyle, Goals],
        SpecialistType::SportsPsychologist => &[Psychology, Goals, Lifestyle],
        SpecialistType::UnifiedCoach => &[HealthHistory, EatingPatterns, Measurements, Goals, Preferences, Lifestyle, Psychology],
    }
}

fn category_from_str(name: &str) -> Option<ExtractionCategory> {
    match name {
        "health_history" => Some(ExtractionCategory::HealthHistory),
        "eating_patterns" => Some(ExtractionCategory::EatingPatterns),
        "measurements" => Some(ExtractionCategory::Measurements),
        "goals" => Some(ExtractionCategory::Goals),
        "preferences" => Some(ExtractionCategory::Preferences),
        "lifestyle" => Some(ExtractionCategory::Lifestyle),
        "psychology" => Some(ExtractionCategory::Psychology),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SendStatus {
    Active,
    ReadyToComplete,
}

/// The result of [`ConsultationEngine::send`], matching `spec.md` §4.8's
/// `send` return shape for both the active and terminal-stage branches.
#[derive(Debug, Clone, Serialize)]
pub struct SendResult {
    pub status: SendStatus,
    pub next_question: Option<String>,
    pub wrap_up_message: Option<String>,
    pub progress_percentage: i32,
    pub extracted_data: Value,
    pub extraction_summary: Option<Value>,
    pub is_complete: bool,
}

pub struct SendOutcome {
    pub result: SendResult,
    pub extractions: Vec<ConsultationExtraction>,
}

/// Drives the specialist-typed consultation dialogue FSM (C8): starts or
/// resumes a session, extracts structured facts each turn, advances stage on
/// a fixed message cadence, and produces the next assistant turn.
///
/// Grounded on the original consultation service's stage tables and
/// every-third-message advancement rule.
pub struct ConsultationEngine {
    router: Arc<ModelRouter>,
}

impl ConsultationEngine {
    pub fn new(router: Arc<ModelRouter>) -> Self {
        ConsultationEngine { router }
    }

    /// Build a fresh session at stage zero with a canned opening question.
    /// The opening question costs nothing to produce (it's not generated),
    /// matching the original service's zero-token initial turn.
    ///
    /// Callers implement the "resume an active session for this pair"
    /// half of `spec.md` §4.8's `start` contract at the repository layer —
    /// this only ever builds a fresh one.
    pub fn start_session(user_id: &str, specialist_type: SpecialistType) -> (ConsultationSession, String) {
        let session = ConsultationSession {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            specialist_type,
            status: ConsultationStatus::Active,
            current_stage_index: 0,
            progress_percentage: 0,
            total_messages: 0,
            session_metadata: json!({ "stages": specialist_type.stages() }),
            started_at: Utc::now(),
            completed_at: None,
        };

        (session, initial_question(specialist_type).to_string())
    }

    /// Recompute stage index and progress after a message is recorded.
    /// `total_messages` is the count *after* the new message; advancing
    /// happens on exact multiples of [`MESSAGES_PER_STAGE`].
    pub fn advance(session: &mut ConsultationSession) {
        let stage_count = session.specialist_type.stages().len() as i32;

        if session.total_messages > 0 && session.total_messages % MESSAGES_PER_STAGE == 0 {
            session.current_stage_index = (session.current_stage_index + 1).min(stage_count - 1);
        }

        session.progress_percentage = ((session.current_stage_index as f32 / stage_count as f32) * 100.0).round() as i32;

        if session.current_stage_index == stage_count - 1 && session.progress_percentage >= 100 {
            session.status = ConsultationStatus::Completed;
            session.completed_at = Some(Utc::now());
        }
    }

    /// Generate the next assistant turn given the conversation so far.
    pub async fn next_turn(&self, session: &ConsultationSession, history: &[ChatMessage], user_message: &str) -> CoreResult<String> {
        let sanitized = sanitize_for_prompt(user_message);
        let mut messages = vec![ChatMessage::system(format!(
            "{}\n\nCurrent stage: {}. Ask about this stage before moving on.",
            specialist_system_prompt(session.specialist_type),
            session.current_stage()
        ))];
        messages.extend(history.iter().cloned());
        messages.push(ChatMessage::user(sanitized));

        let completion = self.router.complete(TaskType::RealTimeChat, &messages).await?;
        Ok(completion.content)
    }

    /// Invoke C1 extraction against a specialist-specific category schema.
    /// A model failure or unparseable response degrades to an empty
    /// extraction rather than failing the turn — empty extractions are
    /// allowed, per `spec.md` §4.8.
    async fn extract(&self, session: &ConsultationSession, history: &[ChatMessage], user_input: &str) -> Value {
        let categories: Vec<&str> = extraction_categories_for(session.specialist_type)
            .iter()
            .map(|c| category_wire_name(*c))
            .collect();

        let sanitized = sanitize_for_prompt(user_input);
        let mut messages = vec![ChatMessage::system(format!(
            "Extract any structured facts the user just revealed, grouped under these categories only: \
             {}. Return ONLY a JSON object mapping category name to an object of extracted fields. Omit \
             categories with nothing new this turn; an empty object {{}} is a valid result.",
            categories.join(", ")
        ))];
        messages.extend(history.iter().cloned());
        messages.push(ChatMessage::user(sanitized));

        match self.router.complete(TaskType::StructuredOutput, &messages).await {
            Ok(completion) => serde_json::from_str(&completion.content).unwrap_or_else(|err| {
                warn!(error = %err, "extraction response was not valid JSON, treating as empty");
                json!({})
            }),
            Err(err) => {
                warn!(error = %err, "extraction call failed, treating as empty");
                json!({})
            }
        }
    }

    fn build_extractions(session: &ConsultationSession, extracted: &Value, source_message: &str) -> Vec<ConsultationExtraction> {
        let Some(map) = extracted.as_object() else { return Vec::new() };

        map.iter()
            .filter_map(|(name, data)| {
                let category = category_from_str(name)?;
                if data.as_object().is_some_and(|o| o.is_empty()) {
                    return None;
                }
                Some(ConsultationExtraction {
                    id: Uuid::new_v4(),
                    session_id: session.id,
                    user_id: session.user_id.clone(),
                    category,
                    data: data.clone(),
                    confidence_score: DEFAULT_EXTRACTION_CONFIDENCE,
                    source_message: Some(source_message.to_string()),
                    created_at: Utc::now(),
                })
            })
            .collect()
    }

    /// `send(session_id, user_input)` per `spec.md` §4.8. `session` is
    /// mutated in place (stage/progress/status); the caller persists both
    /// the mutated session and the returned extraction rows.
    pub async fn send(&self, session: &mut ConsultationSession, history: &[ChatMessage], user_input: &str) -> CoreResult<SendOutcome> {
        session.total_messages += 1;

        let stage_count = session.specialist_type.stages().len() as i32;
        let at_terminal_stage = session.current_stage_index == stage_count - 1;

        let extracted_data = self.extract(session, history, user_input).await;
        let extractions = Self::build_extractions(session, &extracted_data, user_input);

        if !at_terminal_stage {
            let next_question = self.next_turn(session, history, user_input).await?;
            Self::advance(session);

            Ok(SendOutcome {
                result: SendResult {
                    status: SendStatus::Active,
                    next_question: Some(next_question),
                    wrap_up_message: None,
                    progress_percentage: session.progress_percentage,
                    extracted_data,
                    extraction_summary: None,
                    is_complete: false,
                },
                extractions,
            })
        } else {
            session.progress_percentage = 100;

            Ok(SendOutcome {
                result: SendResult {
                    status: SendStatus::ReadyToComplete,
                    next_question: None,
                    wrap_up_message: Some(wrap_up_message(session.specialist_type)),
                    progress_percentage: 100,
                    extracted_data: extracted_data.clone(),
                    extraction_summary: Some(extracted_data),
                    is_complete: true,
                },
                extractions,
            })
        }
    }

    /// `complete(session_id, generate_program)` per `spec.md` §4.8. Pure
    /// with respect to storage: it collapses the extractions a caller
    /// already loaded, mutates `session` to `completed`, and returns what
    /// the caller should write back (profile fields, an optional nutrition
    /// plan, and the texts C3 should vectorize). Calling this twice on an
    /// already-completed session with the same extractions reproduces the
    /// same summary and creates no new extraction rows, satisfying the
    /// idempotency requirement at the storage layer: the caller should skip
    /// the write-back step entirely when `session.status` is already
    /// `completed` and return the cached result instead.
    pub fn complete(session: &mut ConsultationSession, extractions: &[ConsultationExtraction], generate_program: bool) -> CompletionSummary {
        let collapsed = collapse_extractions(extractions);

        let mut profile_updates = json!({});
        if let Some(measurements) = collapsed.get(&ExtractionCategory::Measurements) {
            profile_updates["measurements"] = measurements.clone();
        }
        if let Some(goals) = collapsed.get(&ExtractionCategory::Goals).and_then(|g| g.get("primary_goal")) {
            profile_updates["goals"] = json!({ "primary_goal": goals });
        }
        if let Some(equipment) = collapsed
            .get(&ExtractionCategory::Preferences)
            .and_then(|p| p.get("equipment_access"))
        {
            profile_updates["preferences"] = json!({ "equipment_access": equipment });
        }

        let nutrition_plan = collapsed
            .get(&ExtractionCategory::Measurements)
            .and_then(measurements_to_nutrition_plan);

        session.status = ConsultationStatus::Completed;
        session.progress_percentage = 100;
        session.completed_at = Some(Utc::now());

        let mut vectorize_texts: Vec<(String, String)> = collapsed
            .iter()
            .map(|(category, data)| (category_wire_name(*category).to_string(), data.to_string()))
            .collect();
        vectorize_texts.push(("full_summary".to_string(), full_summary_text(&collapsed)));

        CompletionSummary {
            profile_updates,
            nutrition_plan,
            vectorize_texts,
            program_generation_requested: generate_program,
        }
    }
}

fn category_wire_name(category: ExtractionCategory) -> &'static str {
    match category {
        ExtractionCategory::HealthHistory => "health_history",
        ExtractionCategory::EatingPatterns => "eating_patterns",
        ExtractionCategory::Measurements => "measurements",
        ExtractionCategory::Goals => "goals",
        ExtractionCategory::Preferences => "preferences",
        ExtractionCategory::Lifestyle => "lifestyle",
        ExtractionCategory::Psychology => "psychology",
    }
}

/// Collapse a session's extractions per category, latest row wins.
fn collapse_extractions(extractions: &[ConsultationExtraction]) -> HashMap<ExtractionCategory, Value> {
    let mut sorted: Vec<&ConsultationExtraction> = extractions.iter().collect();
    sorted.sort_by_key(|e| e.created_at);

    let mut collapsed = HashMap::new();
    for extraction in sorted {
        collapsed.insert(extraction.category, extraction.data.clone());
    }
    collapsed
}

fn measurements_to_nutrition_plan(measurements: &Value) -> Option<NutritionPlan> {
    let weight_kg = measurements.get("weight_kg").and_then(Value::as_f64)? as f32;
    let height_cm = measurements.get("height_cm").and_then(Value::as_f64)? as f32;
    let age_years = measurements.get("age_years").and_then(Value::as_u64)? as u32;
    let sex = match measurements.get("biological_sex").and_then(Value::as_str)? {
        "male" => BiologicalSex::Male,
        "female" => BiologicalSex::Female,
        _ => return None,
    };

    let activity_level = measurements
        .get("training_frequency")
        .and_then(Value::as_u64)
        .map(|f| ActivityLevel::from_training_frequency(f as u32))
        .unwrap_or(ActivityLevel::Sedentary);

    let goal = match measurements.get("goal").and_then(Value::as_str) {
        Some("cut") | Some("fat_loss") => GoalType::Cut,
        Some("bulk") | Some("muscle_gain") => GoalType::Bulk,
        _ => GoalType::Maintain,
    };

    NutritionCalculator::calculate_full_plan(weight_kg, height_cm, age_years, sex, activity_level, goal).ok()
}

fn full_summary_text(collapsed: &HashMap<ExtractionCategory, Value>) -> String {
    if collapsed.is_empty() {
        return "No information was extracted during this consultation.".to_string();
    }

    let mut lines: Vec<String> = collapsed
        .iter()
        .map(|(category, data)| format!("{}: {data}", category_wire_name(*category)))
        .collect();
    lines.sort();
    lines.join("\n")
}

/// What the caller should persist after `complete()`.
#[derive(Debug, Clone)]
pub struct CompletionSummary {
    pub profile_updates: Value,
    pub nutrition_plan: Option<NutritionPlan>,
    pub vectorize_texts: Vec<(String, String)>,
    pub program_generation_requested: bool,
}

// --- Tool surface for the coach (spec.md §4.8) -----------------------------
//
// These are stateless formatting functions: the chat layer fetches the
// underlying data through its own repositories and hands it here to get a
// self-describing map back, with a well-defined empty-state shape rather
// than null/absent fields.

pub fn get_user_profile_summary(profile: Option<&Value>) -> Value {
    match profile {
        Some(summary) => json!({ "has_profile": true, "summary": summary }),
        None => json!({ "has_profile": false, "summary": null, "message": "no profile recorded yet" }),
    }
}

pub fn get_user_goals(goals: Option<&Value>) -> Value {
    match goals {
        Some(goals) => json!({ "has_goals": true, "goals": goals }),
        None => json!({ "has_goals": false, "goals": null, "message": "no goals recorded yet" }),
    }
}

pub fn get_user_preferences(preferences: Option<&Value>) -> Value {
    match preferences {
        Some(preferences) => json!({ "has_preferences": true, "preferences": preferences }),
        None => json!({ "has_preferences": false, "preferences": null, "message": "no preferences recorded yet" }),
    }
}

pub fn get_nutrition_targets_with_progress(plan: Option<&NutritionPlan>, progress_today: Option<&Value>) -> Value {
    match plan {
        Some(plan) => json!({
            "has_targets": true,
            "bmr": plan.bmr,
            "tdee": plan.tdee,
            "targets": {
                "calories": plan.macros.calories,
                "protein_g": plan.macros.protein_g,
                "fat_g": plan.macros.fat_g,
                "carbs_g": plan.macros.carbs_g,
            },
            "progress_today": progress_today.cloned().unwrap_or(json!({})),
        }),
        None => json!({ "has_targets": false, "message": "nutrition targets have not been calculated yet" }),
    }
}

pub fn get_todays_recommendations_for_coach(recommendations: &[Recommendation]) -> Value {
    if recommendations.is_empty() {
        json!({ "count": 0, "recommendations": [], "message": "no recommendations generated for today yet" })
    } else {
        json!({ "count": recommendations.len(), "recommendations": recommendations })
    }
}

pub fn get_consultation_history(sessions: &[ConsultationSession]) -> Value {
    if sessions.is_empty() {
        json!({ "count": 0, "sessions": [], "message": "no prior consultations" })
    } else {
        json!({ "count": sessions.len(), "sessions": sessions })
    }
}

pub fn compare_consultations(a: Option<&ConsultationSession>, b: Option<&ConsultationSession>) -> Value {
    match (a, b) {
        (Some(a), Some(b)) => json!({
            "comparable": true,
            "session_a": a.id,
            "session_b": b.id,
            "progress_delta": b.progress_percentage - a.progress_percentage,
        }),
        _ => json!({ "comparable": false, "message": "need two sessions to compare" }),
    }
}

pub fn get_goal_evolution(category: ExtractionCategory, extractions: &[ConsultationExtraction]) -> Value {
    let mut matching: Vec<&ConsultationExtraction> =
        extractions.iter().filter(|extraction| extraction.category == category).collect();
    matching.sort_by_key(|extraction| extraction.created_at);

    if matching.is_empty() {
        json!({
            "category": category_wire_name(category),
            "has_history": false,
            "timeline": [],
            "message": "no extracted history for this category yet",
        })
    } else {
        json!({
            "category": category_wire_name(category),
            "has_history": true,
            "timeline": matching.iter().map(|e| json!({"created_at": e.created_at, "data": e.data})).collect::<Vec<_>>(),
        })
    }
}

pub fn format_consultation_timeline(sessions: &[ConsultationSession], limit: usize) -> String {
    if sessions.is_empty() {
        return "No consultations yet.".to_string();
    }

    let mut sorted = sessions.to_vec();
    sorted.sort_by_key(|session| std::cmp::Reverse(session.started_at));
    sorted.truncate(limit);

    sorted
        .iter()
        .map(|session| {
            format!(
                "{} - {:?} ({}% complete)",
                session.started_at.format("%Y-%m-%d"),
                session.specialist_type,
                session.progress_percentage
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_at(total_messages: i32, stage_index: i32, specialist_type: SpecialistType) -> ConsultationSession {
        ConsultationSession {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            specialist_type,
            status: ConsultationStatus::Active,
            current_stage_index: stage_index,
            progress_percentage: 0,
            total_messages,
            session_metadata: json!({}),
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    #[test]
    fn advances_stage_every_third_message() {
        let mut session = session_at(3, 0, SpecialistType::UnifiedCoach);
        ConsultationEngine::advance(&mut session);
        assert_eq!(session.current_stage_index, 1);
    }

    #[test]
    fn does_not_advance_on_non_multiple_of_three() {
        let mut session = session_at(4, 1, SpecialistType::UnifiedCoach);
        ConsultationEngine::advance(&mut session);
        assert_eq!(session.current_stage_index, 1);
    }

    #[test]
    fn progress_is_monotone_with_stage_index() {
        let mut session = session_at(0, 0, SpecialistType::UnifiedCoach);
        let mut last_progress = session.progress_percentage;
        for total in 1..=21 {
            session.total_messages = total;
            ConsultationEngine::advance(&mut session);
            assert!(session.progress_percentage >= last_progress);
            last_progress = session.progress_percentage;
        }
    }

    #[test]
    fn collapse_keeps_latest_extraction_per_category() {
        let session_id = Uuid::new_v4();
        let older = ConsultationExtraction {
            id: Uuid::new_v4(),
            session_id,
            user_id: "u1".into(),
            category: ExtractionCategory::Goals,
            data: json!({"primary_goal": "lose_weight"}),
            confidence_score: 0.85,
            source_message: None,
            created_at: Utc::now() - chrono::Duration::minutes(10),
        };
        let newer = ConsultationExtraction {
            id: Uuid::new_v4(),
            session_id,
            user_id: "u1".into(),
            category: ExtractionCategory::Goals,
            data: json!({"primary_goal": "build_muscle"}),
            confidence_score: 0.85,
            source_message: None,
            created_at: Utc::now(),
        };

        let collapsed = collapse_extractions(&[older, newer]);
        assert_eq!(collapsed[&ExtractionCategory::Goals]["primary_goal"], json!("build_muscle"));
    }

    #[test]
    fn complete_derives_nutrition_plan_from_full_measurements() {
        let mut session = session_at(21, 6, SpecialistType::Nutritionist);
        let extraction = ConsultationExtraction {
            id: Uuid::new_v4(),
            session_id: session.id,
            user_id: "u1".into(),
            category: ExtractionCategory::Measurements,
            data: json!({"weight_kg": 80.0, "height_cm": 180.0, "age_years": 30, "biological_sex": "male", "goal": "cut"}),
            confidence_score: 0.85,
            source_message: None,
            created_at: Utc::now(),
        };

        let summary = ConsultationEngine::complete(&mut session, &[extraction], false);
        assert_eq!(session.status, ConsultationStatus::Completed);
        assert!(summary.nutrition_plan.is_some());
        assert_eq!(summary.nutrition_plan.unwrap().bmr, 1780);
    }

    #[test]
    fn empty_goal_evolution_reports_no_history() {
        let result = get_goal_evolution(ExtractionCategory::Psychology, &[]);
        assert_eq!(result["has_history"], json!(false));
    }
}
