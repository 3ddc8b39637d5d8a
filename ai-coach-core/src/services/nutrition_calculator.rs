use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiologicalSex {
    Male,
    Female,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityLevel {
    Sedentary,
    LightlyActive,
    ModeratelyActive,
    VeryActive,
    ExtremelyActive,
}

impl ActivityLevel {
    /// Multiplier applied to BMR to estimate total daily energy expenditure,
    /// matching the original calculator's table exactly.
    pub fn multiplier(self) -> f32 {
        match self {
            ActivityLevel::Sedentary => 1.2,
            ActivityLevel::LightlyActive => 1.375,
            ActivityLevel::ModeratelyActive => 1.55,
            ActivityLevel::VeryActive => 1.725,
            ActivityLevel::ExtremelyActive => 1.9,
        }
    }

    /// Derive an activity level from weekly training frequency when the
    /// user hasn't picked one explicitly.
    pub fn from_training_frequency(sessions_per_week: u32) -> Self {
        if sessions_per_week >= 6 {
            ActivityLevel::VeryActive
        } else if sessions_per_week >= 4 {
            ActivityLevel::ModeratelyActive
        } else if sessions_per_week >= 2 {
            ActivityLevel::LightlyActive
        } else {
            ActivityLevel::Sedentary
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalType {
    Cut,
    Bulk,
    Maintain,
}

#[derive(Debug, Clone, Copy)]
pub struct MacroTargets {
    pub calories: i32,
    pub protein_g: i32,
    pub fat_g: i32,
    pub carbs_g: i32,
    pub protein_pct: f32,
    pub fat_pct: f32,
    pub carbs_pct: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct NutritionPlan {
    pub bmr: i32,
    pub activity_level: ActivityLevel,
    pub tdee: i32,
    pub goal: GoalType,
    pub macros: MacroTargets,
}

/// Deterministic BMR/TDEE/macro arithmetic backing the consultation engine's
/// nutrition recommendations (C8). Every constant matches the original
/// calculator: Mifflin-St Jeor for BMR, fixed activity multipliers for TDEE,
/// and fixed percentage adjustments per goal.
pub struct NutritionCalculator;

impl NutritionCalculator {
    /// Mifflin-St Jeor BMR, in kcal/day.
    pub fn calculate_bmr(weight_kg: f32, height_cm: f32, age_years: u32, sex: BiologicalSex) -> CoreResult<i32> {
        if !(0.0..=500.0).contains(&weight_kg) || weight_kg <= 0.0 {
            return Err(CoreError::invalid_input("weight_kg must be in (0, 500]"));
        }
        if !(0.0..=300.0).contains(&height_cm) || height_cm <= 0.0 {
            return Err(CoreError::invalid_input("height_cm must be in (0, 300]"));
        }
        if !(13..=120).contains(&age_years) {
            return Err(CoreError::invalid_input("age_years must be in [13, 120]"));
        }

        let base = 10.0 * weight_kg + 6.25 * height_cm - 5.0 * age_years as f32;
        let bmr = match sex {
            BiologicalSex::Male => base + 5.0,
            BiologicalSex::Female => base - 161.0,
        };

        Ok(bmr.round() as i32)
    }

    pub fn calculate_tdee(bmr: i32, activity_level: ActivityLevel) -> i32 {
        (bmr as f32 * activity_level.multiplier()).round() as i32
    }

    /// Apply the goal's fixed percentage adjustment to TDEE: -20% for a cut,
    /// +10% for a bulk, unchanged for maintenance.
    pub fn adjust_calories_for_goal(tdee: i32, goal: GoalType) -> i32 {
        match goal {
            GoalType::Cut => (tdee as f32 * 0.8).round() as i32,
            GoalType::Bulk => (tdee as f32 * 1.1).round() as i32,
            GoalType::Maintain => tdee,
        }
    }

    /// Protein target in grams, scaled by goal-specific g/kg body weight.
    pub fn calculate_protein_target(weight_kg: f32, goal: GoalType) -> i32 {
        let per_kg = match goal {
            GoalType::Cut => 2.2,
            GoalType::Bulk => 2.0,
            GoalType::Maintain => 1.8,
        };
        (weight_kg * per_kg).round() as i32
    }

    /// Fat fixed at 28% of calories; remaining calories go to carbs.
    pub fn calculate_macros(calories: i32, weight_kg: f32, goal: GoalType) -> MacroTargets {
        let protein_g = Self::calculate_protein_target(weight_kg, goal);
        let protein_cals = protein_g as f32 * 4.0;

        let fat_cals = calories as f32 * 0.28;
        let fat_g = (fat_cals / 9.0).round() as i32;

        let remaining_cals = (calories as f32 - protein_cals - fat_cals).max(0.0);
        let carbs_g = (remaining_cals / 4.0).round() as i32;

        let total_cals = calories.max(1) as f32;
        MacroTargets {
            calories,
            protein_g,
            fat_g,
            carbs_g,
            protein_pct: protein_cals / total_cals * 100.0,
            fat_pct: fat_cals / total_cals * 100.0,
            carbs_pct: carbs_g as f32 * 4.0 / total_cals * 100.0,
        }
    }

    /// Orchestrate the full pipeline: BMR -> TDEE -> goal adjustment ->
    /// macros.
    pub fn calculate_full_plan(
        weight_kg: f32,
        height_cm: f32,
        age_years: u32,
        sex: BiologicalSex,
        activity_level: ActivityLevel,
        goal: GoalType,
    ) -> CoreResult<NutritionPlan> {
        let bmr = Self::calculate_bmr(weight_kg, height_cm, age_years, sex)?;
        let tdee = Self::calculate_tdee(bmr, activity_level);
        let goal_calories = Self::adjust_calories_for_goal(tdee, goal);
        let macros = Self::calculate_macros(goal_calories, weight_kg, goal);

        Ok(NutritionPlan { bmr, activity_level, tdee, goal, macros })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bmr_matches_reference_scenario() {
        let bmr = NutritionCalculator::calculate_bmr(80.0, 180.0, 30, BiologicalSex::Male).unwrap();
        assert_eq!(bmr, 1780);
    }

    #[test]
    fn tdee_matches_reference_scenario() {
        let activity_level = ActivityLevel::from_training_frequency(4);
        assert_eq!(activity_level, ActivityLevel::ModeratelyActive);
        let tdee = NutritionCalculator::calculate_tdee(1780, activity_level);
        assert_eq!(tdee, 2759);
    }

    #[test]
    fn cut_macros_match_reference_scenario() {
        let goal_calories = NutritionCalculator::adjust_calories_for_goal(2759, GoalType::Cut);
        assert_eq!(goal_calories, 2207);

        let macros = NutritionCalculator::calculate_macros(goal_calories, 80.0, GoalType::Cut);
        assert_eq!(macros.protein_g, 176);
        assert_eq!(macros.fat_g, 69);
        assert_eq!(macros.carbs_g, 220);
    }

    #[test]
    fn rejects_out_of_range_weight() {
        let result = NutritionCalculator::calculate_bmr(0.0, 180.0, 30, BiologicalSex::Male);
        assert!(result.is_err());
    }
}
