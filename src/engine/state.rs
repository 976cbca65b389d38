//! Conversation state machine — where each contact is in the dialogue.
//!
//! Each state carries exactly the answers accumulated on the way to it, so
//! an impossible state/context combination cannot be represented, let alone
//! persisted. Serialized as tagged JSON in the cursor row.

use serde::{Deserialize, Serialize};

/// The dialogue position for one contact.
///
/// Signup runs UV → (hours) → zip → household; the weekly check-in runs
/// sick → severity → symptoms. `Idle` is the resting state between cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConvState {
    /// Contact has never interacted (or has no stored cursor).
    Unknown,
    /// Awaiting YES/NO to the far-UV lamp question.
    SignupUv,
    /// Awaiting weekly UV-lamp hours (asked only after a YES).
    SignupUvHours,
    /// Awaiting a zip code.
    SignupZip {
        uv: bool,
        uv_hours: Option<f64>,
    },
    /// Awaiting household size; all earlier answers carried.
    SignupHousehold {
        uv: bool,
        uv_hours: Option<f64>,
        zip: String,
    },
    /// Enrolled and resting between weekly cycles.
    Idle,
    /// Awaiting YES/NO to "were you sick this past week?".
    WeeklySick,
    /// Awaiting a 1-5 severity rating.
    WeeklySeverity,
    /// Awaiting symptom letters; severity carried.
    WeeklySymptoms {
        severity: i64,
    },
}

impl ConvState {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::SignupUv => "signup_uv",
            Self::SignupUvHours => "signup_uv_hours",
            Self::SignupZip { .. } => "signup_zip",
            Self::SignupHousehold { .. } => "signup_household",
            Self::Idle => "idle",
            Self::WeeklySick => "weekly_sick",
            Self::WeeklySeverity => "weekly_severity",
            Self::WeeklySymptoms { .. } => "weekly_symptoms",
        }
    }
}

impl Default for ConvState {
    fn default() -> Self {
        Self::Unknown
    }
}

impl std::fmt::Display for ConvState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
