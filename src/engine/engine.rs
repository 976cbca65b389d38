//! Conversation engine — the decision logic for every inbound message.
//!
//! Given a contact's cursor and an inbound text, decides the next state,
//! persists it, and produces the reply. Invalid input never advances state
//! and resends the same prompt, so every state is idempotent under
//! re-delivery. The whole read-decide-write runs under the contact's lock.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::crypto::{Contact, LookupKey};
use crate::engine::locks::ContactLocks;
use crate::engine::prompts;
use crate::engine::state::ConvState;
use crate::engine::validate::{self, YesNo};
use crate::error::Result;
use crate::model::{self, NewParticipant, NewResponse};
use crate::store::Database;

/// The conversation engine. Sole writer of conversation cursors.
pub struct Engine {
    db: Arc<dyn Database>,
    locks: ContactLocks,
}

impl Engine {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self {
            db,
            locks: ContactLocks::new(),
        }
    }

    /// Handle one inbound message and produce the reply text.
    ///
    /// An empty reply means "send nothing" (used for STOP, which the
    /// provider acknowledges itself).
    pub async fn handle_message(&self, contact: &Contact, body: &str) -> Result<String> {
        let _guard = self.locks.acquire(&contact.handle).await;

        let cursor = self.db.get_cursor(&contact.handle).await?;
        let state_name = cursor.state.name();

        let reply = match cursor.state {
            ConvState::Unknown => self.start_signup(contact).await?,
            ConvState::Idle => {
                self.handle_command(contact, cursor.participant_id, body)
                    .await?
            }

            ConvState::SignupUv => self.signup_uv(contact, body).await?,
            ConvState::SignupUvHours => self.signup_uv_hours(contact, body).await?,
            ConvState::SignupZip { uv, uv_hours } => {
                self.signup_zip(contact, uv, uv_hours, body).await?
            }
            ConvState::SignupHousehold { uv, uv_hours, zip } => {
                self.signup_household(contact, uv, uv_hours, zip, body).await?
            }

            ConvState::WeeklySick => {
                self.weekly_sick(contact, cursor.participant_id, body).await?
            }
            ConvState::WeeklySeverity => {
                self.weekly_severity(contact, cursor.participant_id, body).await?
            }
            ConvState::WeeklySymptoms { severity } => {
                self.weekly_symptoms(contact, cursor.participant_id, severity, body)
                    .await?
            }
        };

        info!(state = state_name, "Handled inbound message");
        Ok(reply)
    }

    /// Side channel for the weekly sender: move an idle participant into
    /// the `WeeklySick` question after a successful prompt delivery.
    pub async fn begin_weekly_cycle(
        &self,
        key: &LookupKey,
        participant_id: Uuid,
    ) -> Result<()> {
        let _guard = self.locks.acquire(key).await;
        self.db
            .set_cursor(key, &ConvState::WeeklySick, Some(participant_id))
            .await?;
        Ok(())
    }

    // ── Unknown / Idle (command handling) ───────────────────────────

    /// A contact with no dialogue history: any text begins signup, unless
    /// a participant already exists for this phone.
    async fn start_signup(&self, contact: &Contact) -> Result<String> {
        if self.db.get_participant(&contact.handle).await?.is_some() {
            return Ok(prompts::ALREADY_ENROLLED.to_string());
        }
        self.db
            .set_cursor(&contact.handle, &ConvState::SignupUv, None)
            .await?;
        Ok(prompts::WELCOME_AND_UV.to_string())
    }

    /// Idle contacts get command handling: SIGNUP, STOP, STATUS, or a
    /// generic acknowledgment. These never apply mid-flow.
    async fn handle_command(
        &self,
        contact: &Contact,
        participant_id: Option<Uuid>,
        body: &str,
    ) -> Result<String> {
        match body.trim().to_uppercase().as_str() {
            "SIGNUP" => self.start_signup(contact).await,
            "STOP" => {
                if let Some(pid) = participant_id {
                    self.db.deactivate_participant(pid).await?;
                    info!(participant_id = %pid, "Participant opted out");
                }
                // The provider sends its own STOP acknowledgment.
                Ok(String::new())
            }
            "STATUS" => match self.db.get_participant(&contact.handle).await? {
                Some(p) if p.active => Ok(prompts::status_enrolled(p.uv_exposure)),
                _ => Ok(prompts::NOT_ENROLLED.to_string()),
            },
            _ => {
                if self.db.get_participant(&contact.handle).await?.is_some() {
                    Ok(prompts::IDLE_ACK.to_string())
                } else {
                    Ok(prompts::UNKNOWN_ACK.to_string())
                }
            }
        }
    }

    // ── Signup flow ─────────────────────────────────────────────────

    async fn signup_uv(&self, contact: &Contact, body: &str) -> Result<String> {
        match validate::parse_yes_no(body) {
            Some(YesNo::Yes) => {
                self.db
                    .set_cursor(&contact.handle, &ConvState::SignupUvHours, None)
                    .await?;
                Ok(prompts::ASK_UV_HOURS.to_string())
            }
            Some(YesNo::No) => {
                let next = ConvState::SignupZip {
                    uv: false,
                    uv_hours: None,
                };
                self.db.set_cursor(&contact.handle, &next, None).await?;
                Ok(prompts::ASK_ZIP.to_string())
            }
            None => Ok(prompts::UV_REPROMPT.to_string()),
        }
    }

    async fn signup_uv_hours(&self, contact: &Contact, body: &str) -> Result<String> {
        match validate::parse_number(body).filter(|h| *h >= 0.0) {
            Some(hours) => {
                // This state is only reachable after a YES.
                let next = ConvState::SignupZip {
                    uv: true,
                    uv_hours: Some(hours),
                };
                self.db.set_cursor(&contact.handle, &next, None).await?;
                Ok(prompts::ASK_ZIP.to_string())
            }
            None => Ok(prompts::UV_HOURS_REPROMPT.to_string()),
        }
    }

    async fn signup_zip(
        &self,
        contact: &Contact,
        uv: bool,
        uv_hours: Option<f64>,
        body: &str,
    ) -> Result<String> {
        match validate::parse_zip(body) {
            Some(zip) => {
                let next = ConvState::SignupHousehold { uv, uv_hours, zip };
                self.db.set_cursor(&contact.handle, &next, None).await?;
                Ok(prompts::ASK_HOUSEHOLD.to_string())
            }
            None => Ok(prompts::ZIP_REPROMPT.to_string()),
        }
    }

    async fn signup_household(
        &self,
        contact: &Contact,
        uv: bool,
        uv_hours: Option<f64>,
        zip: String,
        body: &str,
    ) -> Result<String> {
        match validate::parse_number(body).filter(|n| *n >= 1.0) {
            Some(size) => {
                let new = NewParticipant {
                    lookup_key: contact.handle.clone(),
                    sealed_phone: contact.sealed_phone.clone(),
                    uv_exposure: uv,
                    uv_hours_per_week: uv_hours,
                    zip_code: zip,
                    household_size: size as i64,
                };
                let pid = self.db.create_participant(&new).await?;
                self.db
                    .set_cursor(&contact.handle, &ConvState::Idle, Some(pid))
                    .await?;
                info!(participant_id = %pid, "Signup complete");
                Ok(prompts::SIGNUP_DONE.to_string())
            }
            None => Ok(prompts::HOUSEHOLD_REPROMPT.to_string()),
        }
    }

    // ── Weekly check-in flow ────────────────────────────────────────

    async fn weekly_sick(
        &self,
        contact: &Contact,
        participant_id: Option<Uuid>,
        body: &str,
    ) -> Result<String> {
        let Some(pid) = participant_id else {
            return self.recover_unbound_weekly(contact).await;
        };
        match validate::parse_yes_no(body) {
            Some(YesNo::Yes) => {
                self.db
                    .set_cursor(&contact.handle, &ConvState::WeeklySeverity, Some(pid))
                    .await?;
                Ok(prompts::ASK_SEVERITY.to_string())
            }
            Some(YesNo::No) => {
                let response = NewResponse::healthy(pid, model::current_week_start());
                if !self.db.record_response(&response).await? {
                    warn!(participant_id = %pid, "Duplicate weekly response ignored");
                }
                self.db
                    .set_cursor(&contact.handle, &ConvState::Idle, Some(pid))
                    .await?;
                Ok(prompts::WEEKLY_DONE_HEALTHY.to_string())
            }
            None => Ok(prompts::WEEKLY_SICK_REPROMPT.to_string()),
        }
    }

    async fn weekly_severity(
        &self,
        contact: &Contact,
        participant_id: Option<Uuid>,
        body: &str,
    ) -> Result<String> {
        let Some(pid) = participant_id else {
            return self.recover_unbound_weekly(contact).await;
        };
        match validate::parse_number(body).filter(|n| (1.0..=5.0).contains(n)) {
            Some(severity) => {
                let next = ConvState::WeeklySymptoms {
                    severity: severity as i64,
                };
                self.db.set_cursor(&contact.handle, &next, Some(pid)).await?;
                Ok(prompts::ASK_SYMPTOMS.to_string())
            }
            None => Ok(prompts::SEVERITY_REPROMPT.to_string()),
        }
    }

    async fn weekly_symptoms(
        &self,
        contact: &Contact,
        participant_id: Option<Uuid>,
        severity: i64,
        body: &str,
    ) -> Result<String> {
        let Some(pid) = participant_id else {
            return self.recover_unbound_weekly(contact).await;
        };
        match validate::parse_symptoms(body) {
            Some(symptoms) => {
                let response =
                    NewResponse::sick(pid, model::current_week_start(), severity, symptoms);
                if !self.db.record_response(&response).await? {
                    warn!(participant_id = %pid, "Duplicate weekly response ignored");
                }
                self.db
                    .set_cursor(&contact.handle, &ConvState::Idle, Some(pid))
                    .await?;
                Ok(prompts::WEEKLY_DONE_SICK.to_string())
            }
            None => Ok(prompts::SYMPTOMS_REPROMPT.to_string()),
        }
    }

    /// Weekly states always enter with a bound participant id. If a cursor
    /// shows up without one, reset to idle rather than record an orphan row.
    async fn recover_unbound_weekly(&self, contact: &Contact) -> Result<String> {
        warn!("Weekly cursor without bound participant; resetting to idle");
        self.db
            .set_cursor(&contact.handle, &ConvState::Idle, None)
            .await?;
        Ok(prompts::UNKNOWN_ACK.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SealedPhone;
    use crate::store::LibSqlBackend;

    async fn engine() -> (Engine, Arc<dyn Database>) {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        (Engine::new(Arc::clone(&db)), db)
    }

    fn contact(n: &str) -> Contact {
        Contact {
            handle: LookupKey::from_stored(format!("handle-{n}")),
            sealed_phone: SealedPhone::from_stored(format!("sealed-{n}")),
        }
    }

    /// Run the full scripted signup for a contact.
    async fn enroll(eng: &Engine, c: &Contact) -> Uuid {
        eng.handle_message(c, "SIGNUP").await.unwrap();
        eng.handle_message(c, "yes").await.unwrap();
        eng.handle_message(c, "20").await.unwrap();
        eng.handle_message(c, "90210").await.unwrap();
        eng.handle_message(c, "3").await.unwrap();
        eng.db
            .get_participant(&c.handle)
            .await
            .unwrap()
            .expect("participant created")
            .id
    }

    #[tokio::test]
    async fn unknown_contact_enters_signup_without_participant() {
        let (eng, db) = engine().await;
        let c = contact("a");

        let reply = eng.handle_message(&c, "hello there").await.unwrap();
        assert_eq!(reply, prompts::WELCOME_AND_UV);
        assert_eq!(
            db.get_cursor(&c.handle).await.unwrap().state,
            ConvState::SignupUv
        );
        assert!(db.get_participant(&c.handle).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn full_signup_scenario() {
        let (eng, db) = engine().await;
        let c = contact("a");

        assert_eq!(
            eng.handle_message(&c, "SIGNUP").await.unwrap(),
            prompts::WELCOME_AND_UV
        );
        assert_eq!(
            eng.handle_message(&c, "yes").await.unwrap(),
            prompts::ASK_UV_HOURS
        );
        assert_eq!(eng.handle_message(&c, "20").await.unwrap(), prompts::ASK_ZIP);
        assert_eq!(
            eng.handle_message(&c, "90210").await.unwrap(),
            prompts::ASK_HOUSEHOLD
        );
        assert_eq!(
            eng.handle_message(&c, "3").await.unwrap(),
            prompts::SIGNUP_DONE
        );

        let p = db.get_participant(&c.handle).await.unwrap().unwrap();
        assert!(p.uv_exposure);
        assert_eq!(p.uv_hours_per_week, Some(20.0));
        assert_eq!(p.zip_code, "90210");
        assert_eq!(p.household_size, 3);
        assert!(p.active);

        let cursor = db.get_cursor(&c.handle).await.unwrap();
        assert_eq!(cursor.state, ConvState::Idle);
        assert_eq!(cursor.participant_id, Some(p.id));
    }

    #[tokio::test]
    async fn signup_no_uv_skips_hours() {
        let (eng, db) = engine().await;
        let c = contact("a");

        eng.handle_message(&c, "SIGNUP").await.unwrap();
        assert_eq!(eng.handle_message(&c, "no").await.unwrap(), prompts::ASK_ZIP);
        eng.handle_message(&c, "10001-1234").await.unwrap();
        eng.handle_message(&c, "1").await.unwrap();

        let p = db.get_participant(&c.handle).await.unwrap().unwrap();
        assert!(!p.uv_exposure);
        assert_eq!(p.uv_hours_per_week, None);
        assert_eq!(p.zip_code, "10001");
        assert_eq!(p.household_size, 1);
    }

    #[tokio::test]
    async fn invalid_input_never_advances_state() {
        let (eng, db) = engine().await;
        let c = contact("a");
        eng.handle_message(&c, "SIGNUP").await.unwrap();

        // (state we are in, invalid input, expected re-prompt, the valid
        // answer that moves us to the next state)
        let stages: &[(&str, &str, &str)] = &[
            ("maybe", prompts::UV_REPROMPT, "yes"),
            ("lots", prompts::UV_HOURS_REPROMPT, "8"),
            ("9021", prompts::ZIP_REPROMPT, "90210"),
            ("zero", prompts::HOUSEHOLD_REPROMPT, "2"),
        ];

        for (bad, reprompt, good) in stages {
            let before = db.get_cursor(&c.handle).await.unwrap().state;
            // Repeated invalid input is idempotent.
            for _ in 0..3 {
                assert_eq!(&eng.handle_message(&c, bad).await.unwrap(), reprompt);
                assert_eq!(db.get_cursor(&c.handle).await.unwrap().state, before);
            }
            eng.handle_message(&c, good).await.unwrap();
        }

        assert!(db.get_participant(&c.handle).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn negative_hours_and_zero_household_rejected() {
        let (eng, db) = engine().await;
        let c = contact("a");
        eng.handle_message(&c, "SIGNUP").await.unwrap();
        eng.handle_message(&c, "y").await.unwrap();

        assert_eq!(
            eng.handle_message(&c, "-3").await.unwrap(),
            prompts::UV_HOURS_REPROMPT
        );
        eng.handle_message(&c, "0").await.unwrap(); // zero hours is fine
        eng.handle_message(&c, "90210").await.unwrap();
        assert_eq!(
            eng.handle_message(&c, "0").await.unwrap(),
            prompts::HOUSEHOLD_REPROMPT
        );
        assert!(db.get_participant(&c.handle).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn enrolled_contact_cannot_signup_twice() {
        let (eng, db) = engine().await;
        let c = contact("a");
        enroll(&eng, &c).await;

        assert_eq!(
            eng.handle_message(&c, "SIGNUP").await.unwrap(),
            prompts::ALREADY_ENROLLED
        );
        // Still idle, still exactly one participant.
        assert_eq!(db.get_cursor(&c.handle).await.unwrap().state, ConvState::Idle);
    }

    #[tokio::test]
    async fn weekly_no_records_healthy_response() {
        let (eng, db) = engine().await;
        let c = contact("a");
        let pid = enroll(&eng, &c).await;

        eng.begin_weekly_cycle(&c.handle, pid).await.unwrap();
        assert_eq!(
            db.get_cursor(&c.handle).await.unwrap().state,
            ConvState::WeeklySick
        );

        assert_eq!(
            eng.handle_message(&c, "no").await.unwrap(),
            prompts::WEEKLY_DONE_HEALTHY
        );
        assert_eq!(db.get_cursor(&c.handle).await.unwrap().state, ConvState::Idle);

        let rows = db.export_rows().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].sick);
        assert_eq!(rows[0].severity, None);
        assert_eq!(rows[0].symptoms, None);
    }

    #[tokio::test]
    async fn weekly_sick_flow_stores_sorted_symptoms() {
        let (eng, db) = engine().await;
        let c = contact("a");
        let pid = enroll(&eng, &c).await;

        eng.begin_weekly_cycle(&c.handle, pid).await.unwrap();
        assert_eq!(
            eng.handle_message(&c, "YES").await.unwrap(),
            prompts::ASK_SEVERITY
        );
        assert_eq!(
            eng.handle_message(&c, "4").await.unwrap(),
            prompts::ASK_SYMPTOMS
        );
        assert_eq!(
            eng.handle_message(&c, "ac").await.unwrap(),
            prompts::WEEKLY_DONE_SICK
        );

        let rows = db.export_rows().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].sick);
        assert_eq!(rows[0].severity, Some(4));
        assert_eq!(rows[0].symptoms.as_deref(), Some("congestion,cough"));
        assert_eq!(db.get_cursor(&c.handle).await.unwrap().state, ConvState::Idle);
    }

    #[tokio::test]
    async fn weekly_invalid_answers_reprompt_without_transition() {
        let (eng, db) = engine().await;
        let c = contact("a");
        let pid = enroll(&eng, &c).await;
        eng.begin_weekly_cycle(&c.handle, pid).await.unwrap();

        assert_eq!(
            eng.handle_message(&c, "kinda").await.unwrap(),
            prompts::WEEKLY_SICK_REPROMPT
        );
        eng.handle_message(&c, "y").await.unwrap();
        assert_eq!(
            eng.handle_message(&c, "9").await.unwrap(),
            prompts::SEVERITY_REPROMPT
        );
        eng.handle_message(&c, "2").await.unwrap();
        assert_eq!(
            eng.handle_message(&c, "xyz").await.unwrap(),
            prompts::SYMPTOMS_REPROMPT
        );
        assert_eq!(
            db.get_cursor(&c.handle).await.unwrap().state,
            ConvState::WeeklySymptoms { severity: 2 }
        );
        assert!(db.export_rows().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stop_deactivates_and_is_not_reversible() {
        let (eng, db) = engine().await;
        let c = contact("a");
        enroll(&eng, &c).await;

        // STOP replies with nothing; the provider acknowledges.
        assert_eq!(eng.handle_message(&c, "STOP").await.unwrap(), "");
        let p = db.get_participant(&c.handle).await.unwrap().unwrap();
        assert!(!p.active);

        // No inbound path reactivates: SIGNUP sees the existing record,
        // STATUS reports not-enrolled for an inactive participant.
        assert_eq!(
            eng.handle_message(&c, "SIGNUP").await.unwrap(),
            prompts::ALREADY_ENROLLED
        );
        assert_eq!(
            eng.handle_message(&c, "STATUS").await.unwrap(),
            prompts::NOT_ENROLLED
        );
        let p = db.get_participant(&c.handle).await.unwrap().unwrap();
        assert!(!p.active);
    }

    #[tokio::test]
    async fn status_reports_enrollment() {
        let (eng, _db) = engine().await;
        let c = contact("a");
        enroll(&eng, &c).await;

        let reply = eng.handle_message(&c, "status").await.unwrap();
        assert!(reply.contains("UV exposure: Yes"));
    }

    #[tokio::test]
    async fn idle_chatter_gets_acknowledgment() {
        let (eng, _db) = engine().await;
        let c = contact("a");
        enroll(&eng, &c).await;

        assert_eq!(
            eng.handle_message(&c, "thanks!").await.unwrap(),
            prompts::IDLE_ACK
        );
    }

    #[tokio::test]
    async fn commands_do_not_interrupt_sub_flows() {
        let (eng, db) = engine().await;
        let c = contact("a");
        eng.handle_message(&c, "SIGNUP").await.unwrap();

        // Mid-flow STOP is just an invalid YES/NO answer.
        assert_eq!(
            eng.handle_message(&c, "STOP").await.unwrap(),
            prompts::UV_REPROMPT
        );
        assert_eq!(
            db.get_cursor(&c.handle).await.unwrap().state,
            ConvState::SignupUv
        );

        // Mid-flow STATUS is not a zip code either.
        eng.handle_message(&c, "no").await.unwrap();
        assert_eq!(
            eng.handle_message(&c, "STATUS").await.unwrap(),
            prompts::ZIP_REPROMPT
        );
    }

    #[tokio::test]
    async fn duplicate_weekly_answer_does_not_overwrite() {
        let (eng, db) = engine().await;
        let c = contact("a");
        let pid = enroll(&eng, &c).await;

        eng.begin_weekly_cycle(&c.handle, pid).await.unwrap();
        eng.handle_message(&c, "no").await.unwrap();

        // A second cycle in the same week cannot replace the first answer.
        eng.begin_weekly_cycle(&c.handle, pid).await.unwrap();
        eng.handle_message(&c, "yes").await.unwrap();
        eng.handle_message(&c, "5").await.unwrap();
        eng.handle_message(&c, "b").await.unwrap();

        let rows = db.export_rows().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].sick);
    }
}
