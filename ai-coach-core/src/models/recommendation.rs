use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, Type};
use uuid::Uuid;

/// The closed set of recommendation kinds the engine (C9) can emit, per
/// `spec.md` §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "recommendation_type", rename_all = "snake_case")]
pub enum RecommendationType {
    Meal,
    Workout,
    Rest,
    EventReminder,
    Hydration,
    Supplement,
    Note,
    CheckIn,
}

/// `pending` is the only non-terminal status; `completed | rejected |
/// expired` are immutable once reached (`spec.md` §3, §8 invariant 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "recommendation_status", rename_all = "snake_case")]
pub enum RecommendationStatus {
    Pending,
    Accepted,
    Rejected,
    Completed,
    Expired,
}

impl RecommendationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RecommendationStatus::Rejected | RecommendationStatus::Completed | RecommendationStatus::Expired)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Recommendation {
    pub id: Uuid,
    pub user_id: String,
    pub recommendation_date: NaiveDate,
    pub recommendation_time: Option<NaiveTime>,
    pub recommendation_type: RecommendationType,
    /// Type-specific payload, e.g. `{"meal_type": "lunch", "foods": [...]}` ;
    /// kept as a map rather than a per-type struct so the engine can emit
    /// recommendation kinds whose shape isn't formalized elsewhere (rest,
    /// hydration, check-in).
    pub content: Value,
    pub reasoning: String,
    /// `1..=5`, higher is more urgent.
    pub priority: i32,
    pub status: RecommendationStatus,
    pub based_on_data: Value,
    pub expires_at: DateTime<Utc>,
    pub feedback: Option<String>,
    pub feedback_rating: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl Recommendation {
    /// Apply a status transition, rejecting any attempt to mutate a
    /// terminal recommendation (`spec.md` §8 invariant 1).
    pub fn transition(&mut self, new_status: RecommendationStatus) -> Result<(), &'static str> {
        if self.status.is_terminal() {
            return Err("recommendation is in a terminal status and cannot be updated");
        }
        self.status = new_status;
        Ok(())
    }
}

/// Stable ordering for a batch of same-day recommendations, per the Open
/// Question resolution in `SPEC_FULL.md` §3: highest priority first,
/// earliest `recommendation_time` breaks remaining ties (`None` sorts last,
/// since an untimed recommendation has no claim to "earliest").
pub fn sort_recommendations(recommendations: &mut [Recommendation]) {
    recommendations.sort_by(|a, b| {
        b.priority.cmp(&a.priority).then_with(|| match (a.recommendation_time, b.recommendation_time) {
            (Some(at), Some(bt)) => at.cmp(&bt),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        })
    });
}

/// Find the pending recommendation among `pending` that best matches a
/// logged entry whose `recommendation_type`/content tag equals `matches_tag`
/// (e.g. a logged lunch against a `meal` recommendation tagged `"lunch"`),
/// applying the tie-break from Open Question #3 when more than one matches:
/// highest `priority`, then earliest `recommendation_time`.
pub fn best_match_for_log<'a>(
    pending: &'a mut [Recommendation],
    recommendation_type: RecommendationType,
    matches_tag: Option<&str>,
) -> Option<&'a mut Recommendation> {
    let mut candidates: Vec<&mut Recommendation> = pending
        .iter_mut()
        .filter(|r| {
            r.status == RecommendationStatus::Pending
                && r.recommendation_type == recommendation_type
                && matches_tag.map(|tag| r.content.get("meal_type").and_then(Value::as_str) == Some(tag)).unwrap_or(true)
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.priority.cmp(&a.priority).then_with(|| match (a.recommendation_time, b.recommendation_time) {
            (Some(at), Some(bt)) => at.cmp(&bt),
            _ => std::cmp::Ordering::Equal,
        })
    });

    candidates.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(priority: i32, time: Option<NaiveTime>) -> Recommendation {
        Recommendation {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            recommendation_date: NaiveDate::from_ymd_opt(2026, 7, 28).unwrap(),
            recommendation_time: time,
            recommendation_type: RecommendationType::Meal,
            content: Value::Null,
            reasoning: String::new(),
            priority,
            status: RecommendationStatus::Pending,
            based_on_data: Value::Null,
            expires_at: Utc::now(),
            feedback: None,
            feedback_rating: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn terminal_recommendations_reject_further_transitions() {
        let mut r = rec(3, None);
        r.transition(RecommendationStatus::Completed).unwrap();
        assert!(r.transition(RecommendationStatus::Pending).is_err());
    }

    #[test]
    fn sort_breaks_ties_by_priority_then_time() {
        let mut recs = vec![
            rec(3, NaiveTime::from_hms_opt(18, 0, 0)),
            rec(5, NaiveTime::from_hms_opt(7, 0, 0)),
            rec(5, NaiveTime::from_hms_opt(12, 0, 0)),
        ];
        sort_recommendations(&mut recs);
        assert_eq!(recs[0].priority, 5);
        assert_eq!(recs[0].recommendation_time, NaiveTime::from_hms_opt(7, 0, 0));
        assert_eq!(recs[2].priority, 3);
    }
}
