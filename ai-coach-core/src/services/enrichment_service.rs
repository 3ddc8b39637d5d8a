use std::sync::Arc;

use serde::Deserialize;

use crate::capabilities::ChatMessage;
use crate::models::entry::{ActivityEntry, EntrySource, MealEntry, WorkoutEntry};
use crate::services::model_router::{ModelRouter, TaskType};
use crate::services::prompt_security::sanitize_for_prompt;

/// Daily macro targets used to score how well a single meal adheres to a
/// user's overall nutrition plan (§4.7).
#[derive(Debug, Clone, Copy, Default)]
pub struct NutritionTargets {
    pub daily_calories: Option<f32>,
    pub daily_protein_g: Option<f32>,
    pub daily_carbs_g: Option<f32>,
    pub daily_fat_g: Option<f32>,
}

/// Deterministic nutritional/performance scoring plus LLM-assisted sentiment
/// for notes, applied to a freshly classified entry before persistence.
///
/// Grounded directly on the scoring heuristics in the original enrichment
/// service — every constant below (point deltas, thresholds, ratio targets)
/// matches it.
pub struct EnrichmentService {
    router: Option<Arc<ModelRouter>>,
}

impl EnrichmentService {
    pub fn new(router: Option<Arc<ModelRouter>>) -> Self {
        EnrichmentService { router }
    }

    /// Meal quality score (0-10): rewards protein, fiber, low sugar, moderate
    /// sodium, and balanced macro percentages. Neutral meals score 5.0.
    pub fn meal_quality_score(meal: &MealEntry) -> f32 {
        let mut score = 5.0_f32;

        if meal.protein_g >= 30.0 {
            score += 2.0;
        } else if meal.protein_g >= 20.0 {
            score += 1.0;
        }

        if meal.fiber_g >= 5.0 {
            score += 1.0;
        } else if meal.fiber_g >= 3.0 {
            score += 0.5;
        }

        if meal.sugar_g < 10.0 {
            score += 1.0;
        } else if meal.sugar_g > 30.0 {
            score -= 1.0;
        }

        if (200.0..=600.0).contains(&meal.sodium_mg) {
            score += 0.5;
        } else if meal.sodium_mg > 1500.0 {
            score -= 1.0;
        }

        if meal.calories > 0.0 {
            let protein_pct = meal.protein_g * 4.0 / meal.calories * 100.0;
            let carbs_pct = meal.carbs_g * 4.0 / meal.calories * 100.0;
            let fat_pct = meal.fat_g * 9.0 / meal.calories * 100.0;

            if (20.0..=40.0).contains(&protein_pct)
                && (20.0..=50.0).contains(&carbs_pct)
                && (20.0..=35.0).contains(&fat_pct)
            {
                score += 1.0;
            }
        }

        score.clamp(0.0, 10.0)
    }

    /// Macro balance score (0-10): distance from an ideal 30/40/30
    /// protein/carb/fat calorie split, converted to a score where 0 average
    /// deviation is a perfect 10.
    pub fn macro_balance_score(meal: &MealEntry) -> f32 {
        let protein_cals = meal.protein_g * 4.0;
        let carbs_cals = meal.carbs_g * 4.0;
        let fat_cals = meal.fat_g * 9.0;
        let total_cals = protein_cals + carbs_cals + fat_cals;

        if total_cals <= 0.0 {
            return 5.0;
        }

        let protein_pct = protein_cals / total_cals * 100.0;
        let carbs_pct = carbs_cals / total_cals * 100.0;
        let fat_pct = fat_cals / total_cals * 100.0;

        let avg_deviation =
            ((protein_pct - 30.0).abs() + (carbs_pct - 40.0).abs() + (fat_pct - 30.0).abs()) / 3.0;

        (10.0 - avg_deviation / 5.0).clamp(0.0, 10.0)
    }

    /// Adherence to daily nutrition targets (0-10), assuming this meal is
    /// one of roughly 3.5 meals across the day.
    pub fn goal_adherence_score(meal: &MealEntry, targets: NutritionTargets) -> f32 {
        const MEALS_PER_DAY: f32 = 3.5;
        let mut score = 5.0_f32;

        let expected_protein = targets.daily_protein_g.unwrap_or(0.0) / MEALS_PER_DAY;
        let expected_carbs = targets.daily_carbs_g.unwrap_or(0.0) / MEALS_PER_DAY;
        let expected_calories = targets.daily_calories.unwrap_or(0.0) / MEALS_PER_DAY;

        score += adherence_bonus(meal.protein_g, expected_protein, 1.5, 0.5);
        score += adherence_bonus(meal.carbs_g, expected_carbs, 1.0, 0.3);
        score += adherence_bonus(meal.calories, expected_calories, 1.5, 0.5);

        score.clamp(0.0, 10.0)
    }

    pub fn meal_tags(meal: &MealEntry) -> Vec<String> {
        let mut tags = Vec::new();

        if meal.protein_g >= 30.0 {
            tags.push("high-protein".into());
        } else if meal.protein_g >= 20.0 {
            tags.push("moderate-protein".into());
        }

        if meal.carbs_g >= 50.0 {
            tags.push("high-carb".into());
        } else if meal.carbs_g <= 20.0 {
            tags.push("low-carb".into());
        }

        if meal.fiber_g >= 5.0 {
            tags.push("high-fiber".into());
        }

        if meal.sugar_g < 10.0 {
            tags.push("low-sugar".into());
        } else if meal.sugar_g >= 30.0 {
            tags.push("high-sugar".into());
        }

        if (20.0..=40.0).contains(&meal.protein_g)
            && (30.0..=60.0).contains(&meal.carbs_g)
            && (10.0..=25.0).contains(&meal.fat_g)
        {
            tags.push("balanced".into());
        }

        tags
    }

    /// Progressive overload detection by comparing this workout's volume
    /// load to the average of recent same-type workouts.
    pub fn progressive_overload_status(current_volume: f32, recent_volumes: &[f32]) -> Option<&'static str> {
        if current_volume == 0.0 || recent_volumes.len() < 2 {
            return None;
        }

        let avg = recent_volumes.iter().sum::<f32>() / recent_volumes.len() as f32;
        if avg == 0.0 {
            return None;
        }

        if current_volume > avg * 1.05 {
            Some("improving")
        } else if current_volume < avg * 0.95 {
            Some("declining")
        } else {
            Some("maintaining")
        }
    }

    /// Recovery time (hours) needed after a workout, scaling with reported
    /// effort, total volume, and how many muscle groups were trained.
    pub fn workout_recovery_hours(workout: &WorkoutEntry) -> f32 {
        let mut hours = 24.0_f32;

        if let Some(rpe) = workout.rpe {
            if rpe >= 9 {
                hours += 24.0;
            } else if rpe >= 7 {
                hours += 12.0;
            }
        }

        if workout.volume_load > 20_000.0 {
            hours += 12.0;
        } else if workout.volume_load > 10_000.0 {
            hours += 6.0;
        }

        if workout.muscle_groups.len() >= 3 {
            hours += 12.0;
        }

        hours
    }

    /// Cardio performance score (0-10) by comparing pace to recent similar
    /// activities. Returns a neutral 5.0 with insufficient history.
    pub fn activity_performance_score(
        duration_minutes: f32,
        distance_km: f32,
        recent_paces_min_per_km: &[f32],
    ) -> f32 {
        if recent_paces_min_per_km.len() < 2 || distance_km <= 0.0 {
            return 5.0;
        }

        let avg_pace = recent_paces_min_per_km.iter().sum::<f32>() / recent_paces_min_per_km.len() as f32;
        let current_pace = duration_minutes / distance_km;
        if current_pace <= 0.0 || avg_pace <= 0.0 {
            return 5.0;
        }

        let improvement_pct = (avg_pace - current_pace) / avg_pace * 100.0;

        if improvement_pct > 10.0 {
            9.0
        } else if improvement_pct > 5.0 {
            8.0
        } else if improvement_pct > 0.0 {
            7.0
        } else if improvement_pct > -5.0 {
            5.0
        } else {
            3.0
        }
    }

    pub fn activity_recovery_hours(activity: &ActivityEntry) -> f32 {
        let duration_minutes = activity.elapsed_time_seconds as f32 / 60.0;
        let mut hours = 12.0_f32;

        if duration_minutes > 90.0 {
            hours += 12.0;
        } else if duration_minutes > 60.0 {
            hours += 6.0;
        }

        if let Some(exertion) = activity.perceived_exertion {
            if exertion >= 9 {
                hours += 12.0;
            } else if exertion >= 7 {
                hours += 6.0;
            }
        }

        hours
    }

    /// Sentiment analysis for a free-text note. Tries the configured router
    /// first; falls back to a closed keyword lexicon if no router is
    /// configured or the upstream call fails, so a note is never left
    /// without sentiment because a provider hiccuped.
    pub async fn analyze_note_sentiment(&self, content: &str) -> NoteSentiment {
        if let Some(router) = &self.router {
            if let Ok(sentiment) = self.analyze_sentiment_with_model(router, content).await {
                return sentiment;
            }
        }

        lexicon_sentiment(content)
    }

    async fn analyze_sentiment_with_model(
        &self,
        router: &ModelRouter,
        content: &str,
    ) -> Result<NoteSentiment, crate::error::CoreError> {
        let sanitized = sanitize_for_prompt(content);
        let messages = vec![
            ChatMessage::system(
                "You are a fitness journal analyst. Extract sentiment and themes from user notes. \
                 Return ONLY valid JSON.",
            ),
            ChatMessage::user(format!(
                "Analyze the sentiment and themes in this fitness journal entry.\n\nEntry:\n{sanitized}\n\n\
                 Return JSON: {{\"sentiment\": \"positive|neutral|negative\", \"sentiment_score\": -1.0 to 1.0, \
                 \"detected_themes\": [...], \"related_goals\": [...], \"action_items\": [...]}}"
            )),
        ];

        let completion = router.complete(TaskType::QuickCategorization, &messages).await?;
        let parsed: RawSentiment = serde_json::from_str(&completion.content)
            .map_err(|err| crate::error::CoreError::UpstreamUnavailable(format!("invalid sentiment JSON: {err}")))?;

        Ok(NoteSentiment {
            sentiment: parsed.sentiment,
            sentiment_score: parsed.sentiment_score,
            detected_themes: parsed.detected_themes,
            related_goals: parsed.related_goals,
            action_items: parsed.action_items,
        })
    }
}

fn adherence_bonus(actual: f32, expected: f32, close_bonus: f32, loose_bonus: f32) -> f32 {
    if expected <= 0.0 {
        return 0.0;
    }
    let ratio = actual / expected;
    if (0.8..=1.2).contains(&ratio) {
        close_bonus
    } else if (0.6..=1.4).contains(&ratio) {
        loose_bonus
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawSentiment {
    #[serde(default)]
    sentiment: String,
    #[serde(default)]
    sentiment_score: f32,
    #[serde(default)]
    detected_themes: Vec<String>,
    #[serde(default)]
    related_goals: Vec<String>,
    #[serde(default)]
    action_items: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NoteSentiment {
    pub sentiment: String,
    pub sentiment_score: f32,
    pub detected_themes: Vec<String>,
    pub related_goals: Vec<String>,
    pub action_items: Vec<String>,
}

const POSITIVE_KEYWORDS: &[&str] = &[
    "great", "amazing", "awesome", "love", "motivated", "strong", "progress", "pr",
    "personal record", "feeling good", "energized", "proud", "accomplished", "crushing it", "excited",
];

const NEGATIVE_KEYWORDS: &[&str] = &[
    "tired", "exhausted", "sore", "pain", "injury", "struggling", "frustrated", "unmotivated",
    "weak", "disappointed", "failed", "giving up", "hard", "difficult", "can't",
];

fn lexicon_sentiment(content: &str) -> NoteSentiment {
    let lowered = content.to_lowercase();

    let positive_count = POSITIVE_KEYWORDS.iter().filter(|word| lowered.contains(*word)).count();
    let negative_count = NEGATIVE_KEYWORDS.iter().filter(|word| lowered.contains(*word)).count();
    let total = positive_count + negative_count;

    let sentiment_score = if total == 0 {
        0.0
    } else {
        (positive_count as f32 - negative_count as f32) / total as f32
    };

    let sentiment = if sentiment_score > 0.3 {
        "positive"
    } else if sentiment_score < -0.3 {
        "negative"
    } else {
        "neutral"
    };

    let mut themes = Vec::new();
    if ["motivated", "motivation", "excited"].iter().any(|w| lowered.contains(w)) {
        themes.push("motivation".to_string());
    }
    if ["tired", "sore", "exhausted"].iter().any(|w| lowered.contains(w)) {
        themes.push("recovery".to_string());
    }
    if ["progress", "pr", "personal record", "stronger"].iter().any(|w| lowered.contains(w)) {
        themes.push("progress".to_string());
    }
    if ["goal", "want to", "plan to"].iter().any(|w| lowered.contains(w)) {
        themes.push("goal-setting".to_string());
    }

    NoteSentiment {
        sentiment: sentiment.to_string(),
        sentiment_score: (sentiment_score * 100.0).round() / 100.0,
        detected_themes: themes,
        related_goals: Vec::new(),
        action_items: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_meal() -> MealEntry {
        MealEntry {
            id: uuid::Uuid::new_v4(),
            user_id: "u1".into(),
            name: "Chicken and rice".into(),
            meal_type: "lunch".into(),
            calories: 600.0,
            protein_g: 45.0,
            carbs_g: 60.0,
            fat_g: 15.0,
            fiber_g: 6.0,
            sugar_g: 5.0,
            sodium_mg: 400.0,
            foods: serde_json::Value::Null,
            image_url: None,
            confidence_score: 0.9,
            meal_quality_score: None,
            macro_balance_score: None,
            adherence_to_goals: None,
            enrichment_tags: Vec::new(),
            logged_at: chrono::Utc::now(),
            source: EntrySource::QuickEntry,
            notes: None,
        }
    }

    #[test]
    fn high_protein_high_fiber_low_sugar_meal_scores_above_neutral() {
        let meal = base_meal();
        let score = EnrichmentService::meal_quality_score(&meal);
        assert!(score > 5.0, "expected above-neutral score, got {score}");
    }

    #[test]
    fn lexicon_sentiment_detects_positive_note() {
        let sentiment = lexicon_sentiment("Feeling amazing today, hit a new PR!");
        assert_eq!(sentiment.sentiment, "positive");
    }

    #[test]
    fn lexicon_sentiment_detects_negative_note() {
        let sentiment = lexicon_sentiment("So exhausted and sore, everything feels difficult");
        assert_eq!(sentiment.sentiment, "negative");
    }
}
