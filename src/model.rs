//! Core data model: participants, conversation cursors, weekly responses.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use uuid::Uuid;

use crate::crypto::{LookupKey, SealedPhone};
use crate::engine::state::ConvState;

/// Fixed symptom vocabulary for the weekly check-in, keyed by reply letter.
pub const SYMPTOMS: &[(char, &str)] = &[
    ('A', "cough"),
    ('B', "fever"),
    ('C', "congestion"),
    ('D', "sore throat"),
    ('E', "other"),
];

/// An enrolled participant's identity record.
///
/// Created once at signup completion. Immutable afterward except `active`,
/// which flips to `false` on opt-out. Never deleted.
#[derive(Debug, Clone)]
pub struct Participant {
    pub id: Uuid,
    pub lookup_key: LookupKey,
    pub sealed_phone: SealedPhone,
    pub signup_date: DateTime<Utc>,
    pub uv_exposure: bool,
    pub uv_hours_per_week: Option<f64>,
    pub zip_code: String,
    pub household_size: i64,
    pub active: bool,
}

/// Fields for creating a participant at signup completion.
#[derive(Debug, Clone)]
pub struct NewParticipant {
    pub lookup_key: LookupKey,
    pub sealed_phone: SealedPhone,
    pub uv_exposure: bool,
    pub uv_hours_per_week: Option<f64>,
    pub zip_code: String,
    pub household_size: i64,
}

/// An active participant's delivery identity, as loaded for the weekly
/// batch. The phone stays sealed until the moment of send.
#[derive(Debug, Clone)]
pub struct ActiveParticipant {
    pub id: Uuid,
    pub lookup_key: LookupKey,
    pub sealed_phone: SealedPhone,
}

/// The persisted dialogue position for one contact.
///
/// Exists (conceptually) for every contact that has ever texted in; a
/// missing row reads back as `Unknown` with no participant bound.
#[derive(Debug, Clone)]
pub struct Cursor {
    pub state: ConvState,
    pub participant_id: Option<Uuid>,
}

impl Default for Cursor {
    fn default() -> Self {
        Self {
            state: ConvState::Unknown,
            participant_id: None,
        }
    }
}

/// One weekly check-in answer. severity and symptoms are present iff sick.
#[derive(Debug, Clone)]
pub struct Response {
    pub participant_id: Uuid,
    pub week_start: NaiveDate,
    pub sick: bool,
    pub severity: Option<i64>,
    pub symptoms: Option<String>,
    pub responded_at: DateTime<Utc>,
}

/// A weekly answer to record.
#[derive(Debug, Clone)]
pub struct NewResponse {
    pub participant_id: Uuid,
    pub week_start: NaiveDate,
    pub sick: bool,
    pub severity: Option<i64>,
    pub symptoms: Option<String>,
}

impl NewResponse {
    /// A healthy week: sick=false, no severity, no symptoms.
    pub fn healthy(participant_id: Uuid, week_start: NaiveDate) -> Self {
        Self {
            participant_id,
            week_start,
            sick: false,
            severity: None,
            symptoms: None,
        }
    }

    /// A sick week with severity and the joined symptom string.
    pub fn sick(
        participant_id: Uuid,
        week_start: NaiveDate,
        severity: i64,
        symptoms: String,
    ) -> Self {
        Self {
            participant_id,
            week_start,
            sick: true,
            severity: Some(severity),
            symptoms: Some(symptoms),
        }
    }
}

/// The week key anchoring a check-in cycle: the most recent Monday on or
/// before the given date.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// Week key for today (server local date).
pub fn current_week_start() -> NaiveDate {
    week_start(chrono::Local::now().date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn week_start_anchors_to_monday() {
        // 2026-08-24 is a Monday.
        let monday = NaiveDate::from_ymd_opt(2026, 8, 24).unwrap();
        assert_eq!(week_start(monday), monday);
        for offset in 1..7 {
            let day = monday + Duration::days(offset);
            assert_eq!(week_start(day), monday, "offset {offset}");
        }
        // The following Monday starts its own week.
        assert_eq!(
            week_start(monday + Duration::days(7)),
            monday + Duration::days(7)
        );
    }

    #[test]
    fn symptom_vocabulary_is_sorted_by_letter() {
        let letters: Vec<char> = SYMPTOMS.iter().map(|(l, _)| *l).collect();
        assert_eq!(letters, vec!['A', 'B', 'C', 'D', 'E']);
    }
}
