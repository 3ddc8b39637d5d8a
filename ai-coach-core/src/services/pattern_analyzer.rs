use crate::models::entry::{ActivityEntry, ExerciseSet, MealEntry, WorkoutEntry};

/// The closed set of entry families the analyzer can summarize, per
/// `spec.md` §4.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    Activity,
    Workout,
    Meal,
}

/// Statistical summary of a user's recent similar entries, used to seed
/// defaults for quick-entry extraction when the raw text under-specifies a
/// field (e.g. "went for a run" with no distance given).
#[derive(Debug, Clone, Default)]
pub struct ActivityPattern {
    pub sample_size: usize,
    pub duration_avg_minutes: Option<f32>,
    pub distance_avg_km: Option<f32>,
    pub calories_avg: Option<f32>,
    pub consistency: f32,
    pub confidence: f32,
}

#[derive(Debug, Clone, Default)]
pub struct WorkoutPattern {
    pub sample_size: usize,
    pub duration_avg_minutes: Option<f32>,
    /// Up to 5 most frequent exercise names across the sampled workouts,
    /// per `spec.md` §4.5 ("common_exercises: list[string] (top 5)").
    pub common_exercises: Vec<String>,
    pub consistency: f32,
    pub confidence: f32,
}

#[derive(Debug, Clone, Default)]
pub struct MealPattern {
    pub sample_size: usize,
    pub calories_avg: Option<f32>,
    pub protein_avg_g: Option<f32>,
    pub consistency: f32,
    pub confidence: f32,
}

/// Minimum number of similar past entries required before a pattern is
/// considered statistically meaningful; below this, callers should fall back
/// to generic defaults rather than a pattern with an unreliable average.
pub const MIN_SAMPLE_SIZE: usize = 3;

fn average(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f32>() / values.len() as f32)
    }
}

/// `consistency ∈ [0,1]`: how tightly `values` cluster around their mean,
/// derived from the coefficient of variation (`stddev / mean`). A perfectly
/// uniform history (every value identical) scores 1.0; increasingly spread
/// history decays toward 0. Empty or degenerate (zero-mean) inputs score 0 —
/// there is nothing to call consistent.
fn consistency(values: &[f32]) -> f32 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f32>() / values.len() as f32;
    if mean.abs() < f32::EPSILON {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / values.len() as f32;
    let coefficient_of_variation = variance.sqrt() / mean.abs();
    (1.0 - coefficient_of_variation).clamp(0.0, 1.0)
}

/// Confidence grows with sample size, capped at 0.95 so a pattern is never
/// treated as certain — even a hundred similar logs could still miss what
/// today's entry actually means.
fn confidence_for_sample_size(sample_size: usize) -> f32 {
    (0.5 + (sample_size as f32 / 20.0) * 0.45).min(0.95)
}

pub struct PatternAnalyzer;

impl PatternAnalyzer {
    /// Summarize recent activities of the same type. Returns `None` when
    /// fewer than [`MIN_SAMPLE_SIZE`] similar entries are available.
    pub fn analyze_activities(entries: &[ActivityEntry]) -> Option<ActivityPattern> {
        if entries.len() < MIN_SAMPLE_SIZE {
            return None;
        }

        let durations: Vec<f32> =
            entries.iter().map(|e| e.elapsed_time_seconds as f32 / 60.0).collect();
        let distances: Vec<f32> = entries.iter().filter_map(|e| e.distance_meters).map(|m| m / 1000.0).collect();
        let calories: Vec<f32> = entries.iter().filter_map(|e| e.calories).collect();

        Some(ActivityPattern {
            sample_size: entries.len(),
            duration_avg_minutes: average(&durations),
            distance_avg_km: average(&distances),
            calories_avg: average(&calories),
            consistency: consistency(&durations),
            confidence: confidence_for_sample_size(entries.len()),
        })
    }

    pub fn analyze_workouts(entries: &[WorkoutEntry]) -> Option<WorkoutPattern> {
        if entries.len() < MIN_SAMPLE_SIZE {
            return None;
        }

        let durations: Vec<f32> = entries.iter().map(|e| e.duration_minutes as f32).collect();

        let mut counts: Vec<(String, usize)> = Vec::new();
        for entry in entries {
            let exercises: Vec<ExerciseSet> =
                serde_json::from_value(entry.exercises.clone()).unwrap_or_default();
            for exercise in exercises {
                match counts.iter_mut().find(|(name, _)| *name == exercise.exercise_name) {
                    Some((_, count)) => *count += 1,
                    None => counts.push((exercise.exercise_name, 1)),
                }
            }
        }
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        let common_exercises = counts.into_iter().take(5).map(|(name, _)| name).collect();

        Some(WorkoutPattern {
            sample_size: entries.len(),
            duration_avg_minutes: average(&durations),
            common_exercises,
            consistency: consistency(&durations),
            confidence: confidence_for_sample_size(entries.len()),
        })
    }

    pub fn analyze_meals(entries: &[MealEntry]) -> Option<MealPattern> {
        if entries.len() < MIN_SAMPLE_SIZE {
            return None;
        }

        let calories: Vec<f32> = entries.iter().map(|e| e.calories).collect();
        let proteins: Vec<f32> = entries.iter().map(|e| e.protein_g).collect();

        Some(MealPattern {
            sample_size: entries.len(),
            calories_avg: average(&calories),
            protein_avg_g: average(&proteins),
            consistency: consistency(&calories),
            confidence: confidence_for_sample_size(entries.len()),
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::models::entry::EntrySource;

    fn activity(elapsed_secs: i32, distance_m: Option<f32>, calories: Option<f32>) -> ActivityEntry {
        ActivityEntry {
            id: Uuid::new_v4(),
            user_id: "u1".to_string(),
            name: "Run".to_string(),
            activity_type: "cardio".to_string(),
            sport_type: "running".to_string(),
            elapsed_time_seconds: elapsed_secs,
            moving_time_seconds: elapsed_secs,
            distance_meters: distance_m,
            calories,
            perceived_exertion: None,
            mood: None,
            energy_level: None,
            performance_score: None,
            recovery_hours: None,
            start_date: Utc::now(),
            source: EntrySource::QuickEntry,
            confidence_score: 0.8,
            notes: None,
        }
    }

    fn meal(calories: f32, protein_g: f32) -> MealEntry {
        MealEntry {
            id: Uuid::new_v4(),
            user_id: "u1".to_string(),
            name: "Lunch".to_string(),
            meal_type: "lunch".to_string(),
            calories,
            protein_g,
            carbs_g: 50.0,
            fat_g: 15.0,
            fiber_g: 5.0,
            sugar_g: 5.0,
            sodium_mg: 400.0,
            foods: serde_json::json!([]),
            image_url: None,
            confidence_score: 0.8,
            meal_quality_score: None,
            macro_balance_score: None,
            adherence_to_goals: None,
            enrichment_tags: vec![],
            logged_at: Utc::now(),
            source: EntrySource::QuickEntry,
            notes: None,
        }
    }

    #[test]
    fn fewer_than_three_samples_is_absent() {
        let entries = vec![activity(1800, Some(5000.0), Some(400.0)), activity(1800, Some(5000.0), Some(400.0))];
        assert!(PatternAnalyzer::analyze_activities(&entries).is_none());
    }

    /// Boundary case from `spec.md` §8: n=3 samples yields confidence
    /// `0.5 + 3/20*0.45 = 0.5675`.
    #[test]
    fn three_samples_yields_spec_confidence() {
        let entries = vec![
            activity(1800, Some(5000.0), Some(400.0)),
            activity(1800, Some(5000.0), Some(400.0)),
            activity(1800, Some(5000.0), Some(400.0)),
        ];
        let pattern = PatternAnalyzer::analyze_activities(&entries).unwrap();
        assert_eq!(pattern.sample_size, 3);
        assert!((pattern.confidence - 0.5675).abs() < 1e-4);
    }

    #[test]
    fn identical_durations_are_fully_consistent() {
        let entries = vec![
            activity(1800, Some(5000.0), Some(400.0)),
            activity(1800, Some(5000.0), Some(400.0)),
            activity(1800, Some(5000.0), Some(400.0)),
        ];
        let pattern = PatternAnalyzer::analyze_activities(&entries).unwrap();
        assert!((pattern.consistency - 1.0).abs() < 1e-4);
    }

    #[test]
    fn confidence_caps_at_0_95() {
        let entries: Vec<ActivityEntry> =
            (0..100).map(|_| activity(1800, Some(5000.0), Some(400.0))).collect();
        let pattern = PatternAnalyzer::analyze_activities(&entries).unwrap();
        assert!(pattern.confidence <= 0.95);
    }

    #[test]
    fn meal_pattern_averages_calories_and_protein() {
        let entries = vec![meal(500.0, 30.0), meal(600.0, 40.0), meal(400.0, 20.0)];
        let pattern = PatternAnalyzer::analyze_meals(&entries).unwrap();
        assert_eq!(pattern.calories_avg, Some(500.0));
        assert_eq!(pattern.protein_avg_g, Some(30.0));
    }

    #[test]
    fn workout_pattern_ranks_common_exercises_by_frequency() {
        let exercises_a = vec![
            ExerciseSet { exercise_name: "Bench Press".to_string(), sets: 3, reps: 10, weight_kg: 60.0 },
            ExerciseSet { exercise_name: "Squat".to_string(), sets: 3, reps: 10, weight_kg: 80.0 },
        ];
        let exercises_b = vec![ExerciseSet {
            exercise_name: "Bench Press".to_string(),
            sets: 4,
            reps: 8,
            weight_kg: 65.0,
        }];
        let make = |exercises: &[ExerciseSet]| WorkoutEntry {
            id: Uuid::new_v4(),
            user_id: "u1".to_string(),
            notes: None,
            duration_minutes: 45,
            exercises: serde_json::to_value(exercises).unwrap(),
            volume_load: 1000.0,
            muscle_groups: vec!["chest".to_string()],
            rpe: None,
            mood: None,
            progressive_overload_status: None,
            recovery_hours: None,
            started_at: Utc::now(),
            completed_at: None,
            source: EntrySource::QuickEntry,
            confidence_score: 0.8,
        };
        let entries = vec![make(&exercises_a), make(&exercises_b), make(&exercises_a)];
        let pattern = PatternAnalyzer::analyze_workouts(&entries).unwrap();
        assert_eq!(pattern.common_exercises.first().unwrap(), "Bench Press");
        assert!(pattern.common_exercises.len() <= 5);
    }
}
