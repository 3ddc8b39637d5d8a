use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

/// The closed set of events a user can anchor a program to, per `spec.md`
/// §3/§4.9. Each maps to an `EventFamily`, which is what actually drives the
/// periodization template and macro-adjustment rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "event_type", rename_all = "snake_case")]
pub enum EventType {
    Marathon,
    HalfMarathon,
    Ultramarathon,
    Triathlon,
    CyclingRace,
    PowerliftingMeet,
    WeightliftingMeet,
    StrongmanCompetition,
    PhysiqueShow,
    BodybuildingShow,
    GeneralFitnessMilestone,
}

/// The broad training family an event belongs to, used by the
/// recommendation engine (C9) to pick a periodization template and macro
/// adjustment rule — a generalization of the teacher's single-sport
/// seasonal phase logic to the spec's event-anchored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "event_family", rename_all = "snake_case")]
pub enum EventFamily {
    Endurance,
    Strength,
    Physique,
    General,
}

impl EventType {
    pub fn family(self) -> EventFamily {
        match self {
            EventType::Marathon
            | EventType::HalfMarathon
            | EventType::Ultramarathon
            | EventType::Triathlon
            | EventType::CyclingRace => EventFamily::Endurance,
            EventType::PowerliftingMeet | EventType::WeightliftingMeet | EventType::StrongmanCompetition => {
                EventFamily::Strength
            }
            EventType::PhysiqueShow | EventType::BodybuildingShow => EventFamily::Physique,
            EventType::GeneralFitnessMilestone => EventFamily::General,
        }
    }
}

/// Per `spec.md` §3: `upcoming -> training -> tapering -> completed`, with
/// `abandoned` reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "event_status", rename_all = "snake_case")]
pub enum EventStatus {
    Upcoming,
    Training,
    Tapering,
    Completed,
    Abandoned,
}

/// A goal event a program can be anchored to. Invariants (`spec.md` §3):
/// `training_start_date <= peak_week_date <= taper_start_date <= date`, and
/// at most one event per user may have `is_primary_goal = true` — the latter
/// is enforced by the repository layer (unique partial index / transactional
/// check), not representable in the struct itself.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub event_type: EventType,
    pub date: NaiveDate,
    pub training_start_date: NaiveDate,
    pub peak_week_date: NaiveDate,
    pub taper_start_date: NaiveDate,
    pub is_primary_goal: bool,
    pub status: EventStatus,
    pub linked_program_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn family(&self) -> EventFamily {
        self.event_type.family()
    }

    /// Validate the milestone-date ordering invariant from `spec.md` §3.
    pub fn validate_milestones(&self) -> bool {
        self.training_start_date <= self.peak_week_date
            && self.peak_week_date <= self.taper_start_date
            && self.taper_start_date <= self.date
    }

    pub fn days_until(&self, today: NaiveDate) -> i64 {
        (self.date - today).num_days()
    }
}

/// The periodization phase a training day falls into relative to an event,
/// per `spec.md` §4.9 / GLOSSARY. There is no fifth "recovery" phase in the
/// spec; a day on or after `date` still resolves to `Taper` by the same
/// `>=` rule — the spec models post-event behavior via the event's `status`
/// transitioning to `completed`, not a distinct phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodizationPhase {
    PreTraining,
    Build,
    Peak,
    Taper,
}

/// Derive today's periodization phase from an event's milestone dates,
/// exactly per `spec.md` §4.9: `today >= taper_start_date -> taper`;
/// `>= peak_week_date -> peak`; `>= training_start_date -> build`; else
/// `pre_training`.
pub fn derive_periodization_phase(today: NaiveDate, event: &Event) -> PeriodizationPhase {
    if today >= event.taper_start_date {
        PeriodizationPhase::Taper
    } else if today >= event.peak_week_date {
        PeriodizationPhase::Peak
    } else if today >= event.training_start_date {
        PeriodizationPhase::Build
    } else {
        PeriodizationPhase::PreTraining
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_with(training: i64, peak: i64, taper: i64, date: i64) -> Event {
        let base = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        Event {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            name: "Spring Marathon".into(),
            event_type: EventType::Marathon,
            date: base + chrono::Duration::days(date),
            training_start_date: base + chrono::Duration::days(training),
            peak_week_date: base + chrono::Duration::days(peak),
            taper_start_date: base + chrono::Duration::days(taper),
            is_primary_goal: true,
            status: EventStatus::Upcoming,
            linked_program_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn event_on_event_date_is_taper_with_zero_days_until() {
        let event = event_with(0, 60, 80, 90);
        let today = event.date;
        assert_eq!(event.days_until(today), 0);
        assert_eq!(derive_periodization_phase(today, &event), PeriodizationPhase::Taper);
    }

    #[test]
    fn phase_transitions_follow_milestone_order() {
        let event = event_with(0, 60, 80, 90);
        let base = event.training_start_date;
        assert_eq!(derive_periodization_phase(base - chrono::Duration::days(1), &event), PeriodizationPhase::PreTraining);
        assert_eq!(derive_periodization_phase(base, &event), PeriodizationPhase::Build);
        assert_eq!(derive_periodization_phase(event.peak_week_date, &event), PeriodizationPhase::Peak);
        assert_eq!(derive_periodization_phase(event.taper_start_date, &event), PeriodizationPhase::Taper);
    }

    #[test]
    fn milestone_validation_rejects_out_of_order_dates() {
        let mut event = event_with(0, 60, 80, 90);
        event.peak_week_date = event.training_start_date - chrono::Duration::days(1);
        assert!(!event.validate_milestones());
    }
}
