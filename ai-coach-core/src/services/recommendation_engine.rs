use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::capabilities::ChatMessage;
use crate::error::CoreResult;
use crate::models::event::{derive_periodization_phase, Event, EventFamily, PeriodizationPhase};
use crate::models::program::ProgramDay;
use crate::models::recommendation::{Recommendation, RecommendationStatus, RecommendationType};
use crate::services::model_router::{ModelRouter, TaskType};
use crate::services::prompt_security::sanitize_for_prompt;

/// Remaining daily budget after today's logged meals are subtracted out,
/// and which meal slots still need a suggestion.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemainingMealBudget {
    pub calories: f32,
    pub protein_g: f32,
}

/// The fixed meal-type slots the engine can fill, per `spec.md` §4.9.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MealSlot {
    Breakfast,
    Lunch,
    Snack,
    Dinner,
}

impl MealSlot {
    pub fn label(self) -> &'static str {
        match self {
            MealSlot::Breakfast => "breakfast",
            MealSlot::Lunch => "lunch",
            MealSlot::Snack => "snack",
            MealSlot::Dinner => "dinner",
        }
    }

    /// Default time-of-day for this slot, per `spec.md` §4.9.
    pub fn default_time(self) -> NaiveTime {
        match self {
            MealSlot::Breakfast => NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
            MealSlot::Lunch => NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            MealSlot::Snack => NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
            MealSlot::Dinner => NaiveTime::from_hms_opt(18, 30, 0).unwrap(),
        }
    }

    pub const ALL: [MealSlot; 4] = [MealSlot::Breakfast, MealSlot::Lunch, MealSlot::Snack, MealSlot::Dinner];
}

/// Split what's left of the day's calorie/protein budget across the meal
/// slots that haven't been logged yet: snacks get 15% of what remains, the
/// rest is split evenly across the remaining main meals, per `spec.md` §4.9.
pub fn split_remaining_budget(remaining: RemainingMealBudget, missing_slots: &[MealSlot]) -> Vec<(MealSlot, RemainingMealBudget)> {
    if missing_slots.is_empty() {
        return Vec::new();
    }

    let has_snack = missing_slots.contains(&MealSlot::Snack);
    let main_slots: Vec<MealSlot> = missing_slots.iter().copied().filter(|s| *s != MealSlot::Snack).collect();

    let snack_share = if has_snack { 0.15 } else { 0.0 };
    let snack_budget = RemainingMealBudget {
        calories: remaining.calories * snack_share,
        protein_g: remaining.protein_g * snack_share,
    };

    let main_total = RemainingMealBudget {
        calories: remaining.calories * (1.0 - snack_share),
        protein_g: remaining.protein_g * (1.0 - snack_share),
    };

    let main_count = main_slots.len().max(1) as f32;
    let per_main = RemainingMealBudget { calories: main_total.calories / main_count, protein_g: main_total.protein_g / main_count };

    missing_slots
        .iter()
        .map(|slot| (*slot, if *slot == MealSlot::Snack { snack_budget } else { per_main }))
        .collect()
}

/// A closed periodization template keyed by event family, per `spec.md`
/// §4.9: training/taper weeks, named phases, and a nutrition-strategy label
/// carried through to recommendation reasoning text.
#[derive(Debug, Clone, Copy)]
pub struct PeriodizationTemplate {
    pub training_weeks: u32,
    pub taper_weeks: u32,
    pub nutrition_strategy: &'static str,
}

pub fn periodization_template(family: EventFamily) -> PeriodizationTemplate {
    match family {
        EventFamily::Endurance => PeriodizationTemplate {
            training_weeks: 12,
            taper_weeks: 2,
            nutrition_strategy: "progressive carbohydrate loading into race day",
        },
        EventFamily::Strength => PeriodizationTemplate {
            training_weeks: 10,
            taper_weeks: 1,
            nutrition_strategy: "maintenance calories with a light taper-week deficit",
        },
        EventFamily::Physique => PeriodizationTemplate {
            training_weeks: 16,
            taper_weeks: 1,
            nutrition_strategy: "staged cut into a peak-week carb/water manipulation protocol",
        },
        EventFamily::General => PeriodizationTemplate { training_weeks: 8, taper_weeks: 1, nutrition_strategy: "steady maintenance" },
    }
}

/// A macro multiplier set to scale a day's base targets by, per the
/// event-phase adjustment rules in `spec.md` §4.9.
#[derive(Debug, Clone, Copy)]
pub struct MacroAdjustment {
    pub calorie_multiplier: f32,
    pub carb_multiplier: f32,
}

impl Default for MacroAdjustment {
    fn default() -> Self {
        MacroAdjustment { calorie_multiplier: 1.0, carb_multiplier: 1.0 }
    }
}

/// Compute the macro adjustment for `event` on `today`, per `spec.md` §4.9's
/// per-family rules. `days_until` is `event.days_until(today)`.
pub fn macro_adjustment(event: &Event, today: NaiveDate) -> MacroAdjustment {
    let phase = derive_periodization_phase(today, event);
    let days_until = event.days_until(today);

    match event.family() {
        EventFamily::Endurance => match phase {
            PeriodizationPhase::Build => MacroAdjustment { calorie_multiplier: 1.0, carb_multiplier: 1.10 },
            PeriodizationPhase::Peak => MacroAdjustment { calorie_multiplier: 1.0, carb_multiplier: 1.20 },
            PeriodizationPhase::Taper if days_until <= 3 && days_until >= 0 => {
                MacroAdjustment { calorie_multiplier: 1.10, carb_multiplier: 1.50 }
            }
            PeriodizationPhase::Taper => MacroAdjustment { calorie_multiplier: 0.90, carb_multiplier: 1.0 },
            PeriodizationPhase::PreTraining => MacroAdjustment::default(),
        },
        EventFamily::Strength => match phase {
            PeriodizationPhase::Taper if days_until <= 7 && days_until >= 0 => {
                MacroAdjustment { calorie_multiplier: 0.95, carb_multiplier: 1.0 }
            }
            _ => MacroAdjustment::default(),
        },
        EventFamily::Physique => match phase {
            PeriodizationPhase::Build => MacroAdjustment { calorie_multiplier: 1.10, carb_multiplier: 1.0 },
            PeriodizationPhase::Peak => MacroAdjustment { calorie_multiplier: 0.85, carb_multiplier: 0.80 },
            PeriodizationPhase::Taper if days_until <= 2 && days_until >= 0 => {
                MacroAdjustment { calorie_multiplier: 1.0, carb_multiplier: 1.50 }
            }
            PeriodizationPhase::Taper if days_until <= 7 => MacroAdjustment { calorie_multiplier: 1.0, carb_multiplier: 0.50 },
            PeriodizationPhase::Taper | PeriodizationPhase::PreTraining => MacroAdjustment::default(),
        },
        EventFamily::General => MacroAdjustment::default(),
    }
}

/// The milestone day-counts an event reminder fires on, per `spec.md` §4.9.
pub const EVENT_REMINDER_MILESTONES: [i64; 10] = [90, 60, 30, 21, 14, 7, 3, 2, 1, 0];

fn event_reminder_priority(days_until: i64) -> i32 {
    match days_until {
        0 => 5,
        1..=3 => 5,
        7 | 14 => 4,
        21 | 30 => 3,
        _ => 2,
    }
}

fn countdown_message(event: &Event, days_until: i64) -> String {
    if days_until == 0 {
        "TODAY IS THE DAY!".to_string()
    } else if days_until == 1 {
        format!("{} is tomorrow. Trust your training.", event.name)
    } else {
        format!("{} days until {}.", days_until, event.name)
    }
}

fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(date.and_hms_opt(23, 59, 59).expect("valid time"), Utc)
}

/// A short LLM-generated meal idea for one of today's unlogged slots.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct MealSuggestion {
    pub meal_name: String,
    #[serde(default)]
    pub foods: Vec<String>,
    #[serde(default)]
    pub preparation: String,
    pub estimated_calories: f32,
    pub estimated_protein_g: f32,
}

/// Event-aware daily recommendation planner (C9): combines a user's active
/// program, upcoming events, and what's already logged today into a set of
/// typed, time-stamped recommendations.
///
/// Grounded on the teacher's `workout_recommendation_service.rs` seasonal
/// periodization heuristic, generalized from a single implicit season to
/// the spec's explicit per-event milestone dates.
pub struct RecommendationEngine {
    router: Arc<ModelRouter>,
}

impl RecommendationEngine {
    pub fn new(router: Arc<ModelRouter>) -> Self {
        RecommendationEngine { router }
    }

    async fn suggest_meal(&self, slot: MealSlot, budget: RemainingMealBudget) -> CoreResult<MealSuggestion> {
        let prompt = format!(
            "Suggest a {} with roughly {:.0} calories and {:.0}g protein. Return ONLY JSON: \
             {{\"meal_name\": str, \"foods\": [str], \"preparation\": str, \"estimated_calories\": number, \
             \"estimated_protein_g\": number}}",
            slot.label(),
            budget.calories.max(0.0),
            budget.protein_g.max(0.0)
        );
        let messages = vec![
            ChatMessage::system("You are a nutrition coach suggesting quick, realistic meals."),
            ChatMessage::user(sanitize_for_prompt(&prompt)),
        ];
        let config = crate::services::model_router::TaskConfig { prioritize_speed: true, prioritize_accuracy: false };
        let completion = self.router.complete_with(TaskType::StructuredOutput, &messages, config).await?;
        serde_json::from_str(&completion.content)
            .map_err(|err| crate::error::CoreError::UpstreamUnavailable(format!("meal suggestion response was not valid JSON: {err}")))
    }

    /// Produce meal recommendations for every slot in `missing_slots`,
    /// splitting `remaining` across them per `spec.md` §4.9. A slot whose
    /// suggestion call fails is skipped rather than failing the whole plan
    /// — per §7, C9 tolerates secondary-fetch failures.
    pub async fn meal_recommendations(
        &self,
        user_id: &str,
        target_date: NaiveDate,
        remaining: RemainingMealBudget,
        missing_slots: &[MealSlot],
    ) -> Vec<Recommendation> {
        let mut out = Vec::new();
        for (slot, budget) in split_remaining_budget(remaining, missing_slots) {
            let suggestion = match self.suggest_meal(slot, budget).await {
                Ok(s) => s,
                Err(_) => continue,
            };
            out.push(Recommendation {
                id: Uuid::new_v4(),
                user_id: user_id.to_string(),
                recommendation_date: target_date,
                recommendation_time: Some(slot.default_time()),
                recommendation_type: RecommendationType::Meal,
                content: json!({
                    "meal_type": slot.label(),
                    "meal_name": suggestion.meal_name,
                    "foods": suggestion.foods,
                    "preparation": suggestion.preparation,
                    "estimated_calories": suggestion.estimated_calories,
                    "estimated_protein_g": suggestion.estimated_protein_g,
                }),
                reasoning: format!("Fills the remaining {:.0} kcal / {:.0}g protein budget for {}", budget.calories, budget.protein_g, slot.label()),
                priority: 3,
                status: RecommendationStatus::Pending,
                based_on_data: json!({ "remaining_calories": budget.calories, "remaining_protein_g": budget.protein_g }),
                expires_at: end_of_day(target_date),
                feedback: None,
                feedback_rating: None,
                created_at: Utc::now(),
            });
        }
        out
    }

    /// Emit the workout-or-rest recommendation for the day: the scheduled
    /// program day if one exists, otherwise a generic suggestion on
    /// training days (weekday index < weekly training frequency) or rest.
    pub fn workout_recommendation(
        &self,
        user_id: &str,
        target_date: NaiveDate,
        program_day: Option<&ProgramDay>,
        training_frequency: u32,
        event: Option<&Event>,
    ) -> Recommendation {
        let phase_note = event.map(|e| match derive_periodization_phase(target_date, e) {
            PeriodizationPhase::Taper => " Taper week — prioritize recovery over intensity.".to_string(),
            PeriodizationPhase::Peak => " Peak week — this is the hardest training block, execute as planned.".to_string(),
            _ => String::new(),
        }).unwrap_or_default();

        if let Some(day) = program_day {
            return Recommendation {
                id: Uuid::new_v4(),
                user_id: user_id.to_string(),
                recommendation_date: target_date,
                recommendation_time: None,
                recommendation_type: RecommendationType::Workout,
                content: day.planned_workout.clone().unwrap_or(Value::Null),
                reasoning: format!("{}{}", day.rationale, phase_note),
                priority: 4,
                status: RecommendationStatus::Pending,
                based_on_data: json!({ "program_day_id": day.id, "phase": day.periodization_phase }),
                expires_at: end_of_day(target_date),
                feedback: None,
                feedback_rating: None,
                created_at: Utc::now(),
            };
        }

        let weekday_index = target_date.weekday().num_days_from_monday();
        if weekday_index < training_frequency {
            Recommendation {
                id: Uuid::new_v4(),
                user_id: user_id.to_string(),
                recommendation_date: target_date,
                recommendation_time: None,
                recommendation_type: RecommendationType::Workout,
                content: json!({ "suggestion": "general training session" }),
                reasoning: format!("No scheduled program, but today is a training day.{phase_note}"),
                priority: 3,
                status: RecommendationStatus::Pending,
                based_on_data: json!({ "training_frequency": training_frequency }),
                expires_at: end_of_day(target_date),
                feedback: None,
                feedback_rating: None,
                created_at: Utc::now(),
            }
        } else {
            Recommendation {
                id: Uuid::new_v4(),
                user_id: user_id.to_string(),
                recommendation_date: target_date,
                recommendation_time: None,
                recommendation_type: RecommendationType::Rest,
                content: json!({ "suggestion": "rest day" }),
                reasoning: "No scheduled training today.".to_string(),
                priority: 2,
                status: RecommendationStatus::Pending,
                based_on_data: json!({ "training_frequency": training_frequency }),
                expires_at: end_of_day(target_date),
                feedback: None,
                feedback_rating: None,
                created_at: Utc::now(),
            }
        }
    }

    /// Emit an event reminder if `target_date` lands on one of the fixed
    /// countdown milestones from `spec.md` §4.9.
    pub fn event_reminder(&self, user_id: &str, target_date: NaiveDate, event: &Event) -> Option<Recommendation> {
        let days_until = event.days_until(target_date);
        if !EVENT_REMINDER_MILESTONES.contains(&days_until) {
            return None;
        }

        let phase = derive_periodization_phase(target_date, event);
        Some(Recommendation {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            recommendation_date: target_date,
            recommendation_time: None,
            recommendation_type: RecommendationType::EventReminder,
            content: json!({ "event_id": event.id, "event_name": event.name, "days_until": days_until, "phase": format!("{phase:?}") }),
            reasoning: countdown_message(event, days_until),
            priority: event_reminder_priority(days_until),
            status: RecommendationStatus::Pending,
            based_on_data: json!({ "event_date": event.date }),
            expires_at: end_of_day(target_date),
            feedback: None,
            feedback_rating: None,
            created_at: Utc::now(),
        })
    }

    /// `suggest_next_action` (`spec.md` §4.9): the pending recommendation
    /// whose `recommendation_time` is closest to `now` without being more
    /// than 30 minutes in the past, ties broken by higher priority.
    pub fn suggest_next_action<'a>(recommendations: &'a [Recommendation], now: DateTime<Utc>) -> Option<&'a Recommendation> {
        let today = now.date_naive();
        let lower_bound = now - chrono::Duration::minutes(30);

        recommendations
            .iter()
            .filter(|r| r.status == RecommendationStatus::Pending && r.recommendation_date == today)
            .filter_map(|r| r.recommendation_time.map(|t| (r, DateTime::<Utc>::from_naive_utc_and_offset(today.and_time(t), Utc))))
            .filter(|(_, at)| *at >= lower_bound)
            .min_by(|(ra, at_a), (rb, at_b)| {
                let dist_a = (*at_a - now).num_seconds().abs();
                let dist_b = (*at_b - now).num_seconds().abs();
                dist_a.cmp(&dist_b).then_with(|| rb.priority.cmp(&ra.priority))
            })
            .map(|(r, _)| r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::{EventStatus, EventType};

    fn marathon(date: NaiveDate) -> Event {
        Event {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            name: "City Marathon".into(),
            event_type: EventType::Marathon,
            date,
            training_start_date: date - chrono::Duration::days(84),
            peak_week_date: date - chrono::Duration::days(28),
            taper_start_date: date - chrono::Duration::days(7),
            is_primary_goal: true,
            status: EventStatus::Upcoming,
            linked_program_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn event_on_day_zero_reports_today_is_the_day() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 1).unwrap();
        let event = marathon(date);
        assert_eq!(countdown_message(&event, 0), "TODAY IS THE DAY!");
    }

    #[test]
    fn final_three_days_endurance_carb_loads() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 1).unwrap();
        let event = marathon(date);
        let adjustment = macro_adjustment(&event, date - chrono::Duration::days(2));
        assert_eq!(adjustment.carb_multiplier, 1.5);
        assert_eq!(adjustment.calorie_multiplier, 1.1);
    }

    #[test]
    fn budget_split_gives_snack_fifteen_percent() {
        let remaining = RemainingMealBudget { calories: 1000.0, protein_g: 100.0 };
        let split = split_remaining_budget(remaining, &[MealSlot::Snack, MealSlot::Dinner]);
        let snack = split.iter().find(|(s, _)| *s == MealSlot::Snack).unwrap().1;
        assert!((snack.calories - 150.0).abs() < 0.01);
    }

    #[test]
    fn reminder_only_fires_on_fixed_milestones() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 1).unwrap();
        let event = marathon(date);
        assert!(EVENT_REMINDER_MILESTONES.contains(&event.days_until(date - chrono::Duration::days(7))));
        assert!(!EVENT_REMINDER_MILESTONES.contains(&event.days_until(date - chrono::Duration::days(8))));
    }

    fn pending_recommendation(time: NaiveTime, priority: i32, date: NaiveDate) -> Recommendation {
        Recommendation {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            recommendation_date: date,
            recommendation_time: Some(time),
            recommendation_type: RecommendationType::Meal,
            content: json!({}),
            reasoning: String::new(),
            priority,
            status: RecommendationStatus::Pending,
            based_on_data: json!({}),
            expires_at: Utc::now(),
            feedback: None,
            feedback_rating: None,
            created_at: Utc::now(),
        }
    }

    /// Counter-example: with `now` = 12:10, a 12:15 recommendation is 5
    /// minutes away while an 11:50 one is 20 minutes away. The closest one
    /// by absolute distance must win, not whichever is chronologically
    /// first within the admissible `[now-30min, +inf)` window.
    #[test]
    fn suggest_next_action_picks_closest_by_absolute_distance_not_earliest() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 1).unwrap();
        let now = DateTime::<Utc>::from_naive_utc_and_offset(date.and_hms_opt(12, 10, 0).unwrap(), Utc);

        let earlier = pending_recommendation(NaiveTime::from_hms_opt(11, 50, 0).unwrap(), 3, date);
        let closer = pending_recommendation(NaiveTime::from_hms_opt(12, 15, 0).unwrap(), 3, date);
        let recommendations = vec![earlier, closer.clone()];

        let chosen = RecommendationEngine::suggest_next_action(&recommendations, now).unwrap();
        assert_eq!(chosen.id, closer.id);
    }

    #[test]
    fn suggest_next_action_breaks_ties_by_higher_priority() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 1).unwrap();
        let now = DateTime::<Utc>::from_naive_utc_and_offset(date.and_hms_opt(12, 0, 0).unwrap(), Utc);

        let low_priority = pending_recommendation(NaiveTime::from_hms_opt(12, 5, 0).unwrap(), 2, date);
        let high_priority = pending_recommendation(NaiveTime::from_hms_opt(11, 55, 0).unwrap(), 4, date);
        let recommendations = vec![low_priority, high_priority.clone()];

        let chosen = RecommendationEngine::suggest_next_action(&recommendations, now).unwrap();
        assert_eq!(chosen.id, high_priority.id);
    }
}
