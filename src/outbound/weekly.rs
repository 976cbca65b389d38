//! Weekly check-in batch: prompt every active participant and open their
//! weekly cycle.
//!
//! The batch is sequential over participants. A delivery failure for one
//! participant is counted and logged, the cursor stays unchanged (so they
//! remain eligible next run), and the batch continues. Storage failures
//! abort the run.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::crypto::PhoneVault;
use crate::engine::{Engine, prompts};
use crate::error::Result;
use crate::outbound::twilio::SmsSender;
use crate::store::Database;

/// Counts for one batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub sent: usize,
    pub failed: usize,
}

/// Runs the weekly send loop.
pub struct WeeklySender {
    db: Arc<dyn Database>,
    vault: Arc<PhoneVault>,
    sender: Arc<dyn SmsSender>,
    engine: Arc<Engine>,
}

impl WeeklySender {
    pub fn new(
        db: Arc<dyn Database>,
        vault: Arc<PhoneVault>,
        sender: Arc<dyn SmsSender>,
        engine: Arc<Engine>,
    ) -> Self {
        Self {
            db,
            vault,
            sender,
            engine,
        }
    }

    /// Send the weekly prompt to every active participant. Each successful
    /// delivery moves that participant's cursor into the sick question.
    pub async fn run_batch(&self) -> Result<BatchOutcome> {
        let participants = self.db.active_participants().await?;
        let mut outcome = BatchOutcome::default();

        for participant in participants {
            let phone = match self.vault.open(&participant.sealed_phone) {
                Ok(phone) => phone,
                Err(e) => {
                    warn!(participant_id = %participant.id, error = %e,
                        "Could not unseal delivery address; skipping");
                    outcome.failed += 1;
                    continue;
                }
            };

            match self.sender.send(&phone, prompts::WEEKLY_PROMPT).await {
                Ok(()) => {
                    self.engine
                        .begin_weekly_cycle(&participant.lookup_key, participant.id)
                        .await?;
                    outcome.sent += 1;
                }
                Err(e) => {
                    // Cursor untouched: the participant stays eligible for
                    // the next scheduled attempt.
                    warn!(participant_id = %participant.id, error = %e,
                        "Weekly prompt delivery failed");
                    outcome.failed += 1;
                }
            }
        }

        info!(sent = outcome.sent, failed = outcome.failed, "Weekly batch complete");
        Ok(outcome)
    }
}

/// Spawn the in-process weekly ticker: runs a batch each time the cron
/// schedule fires. The schedule is checked once a minute.
pub fn spawn_cron_ticker(
    sender: Arc<WeeklySender>,
    schedule: cron::Schedule,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut next_fire = schedule.upcoming(Utc).next();
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        // Skip immediate first tick
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(fire_at) = next_fire else {
                warn!("Weekly cron schedule has no upcoming fire time; ticker stopping");
                break;
            };
            if Utc::now() >= fire_at {
                if let Err(e) = sender.run_batch().await {
                    error!(error = %e, "Weekly batch failed");
                }
                next_fire = schedule.upcoming(Utc).next();
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use base64::Engine as _;
    use secrecy::SecretString;
    use tokio::sync::Mutex;

    use crate::config::CryptoConfig;
    use crate::engine::state::ConvState;
    use crate::error::DeliveryError;
    use crate::model::NewParticipant;
    use crate::store::LibSqlBackend;

    /// Records sends; fails for numbers in the deny list.
    struct MockSender {
        sent_to: Mutex<Vec<String>>,
        fail_for: Vec<String>,
    }

    impl MockSender {
        fn new(fail_for: Vec<String>) -> Self {
            Self {
                sent_to: Mutex::new(Vec::new()),
                fail_for,
            }
        }
    }

    #[async_trait]
    impl SmsSender for MockSender {
        async fn send(&self, to: &str, _body: &str) -> std::result::Result<(), DeliveryError> {
            if self.fail_for.iter().any(|f| f == to) {
                return Err(DeliveryError::Request("unreachable".to_string()));
            }
            self.sent_to.lock().await.push(to.to_string());
            Ok(())
        }
    }

    fn vault() -> Arc<PhoneVault> {
        Arc::new(
            PhoneVault::new(&CryptoConfig {
                encryption_key: SecretString::from(
                    base64::engine::general_purpose::STANDARD.encode([9u8; 32]),
                ),
            })
            .unwrap(),
        )
    }

    async fn enroll_phone(
        db: &Arc<dyn Database>,
        vault: &PhoneVault,
        phone: &str,
    ) -> uuid::Uuid {
        let contact = vault.contact(phone);
        let pid = db
            .create_participant(&NewParticipant {
                lookup_key: contact.handle.clone(),
                sealed_phone: contact.sealed_phone,
                uv_exposure: false,
                uv_hours_per_week: None,
                zip_code: "90210".to_string(),
                household_size: 2,
            })
            .await
            .unwrap();
        db.set_cursor(&contact.handle, &ConvState::Idle, Some(pid))
            .await
            .unwrap();
        pid
    }

    #[tokio::test]
    async fn batch_prompts_all_active_participants() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let vault = vault();
        enroll_phone(&db, &vault, "+15551110001").await;
        enroll_phone(&db, &vault, "+15551110002").await;

        let mock = Arc::new(MockSender::new(vec![]));
        let weekly = WeeklySender::new(
            Arc::clone(&db),
            Arc::clone(&vault),
            Arc::clone(&mock) as Arc<dyn SmsSender>,
            Arc::new(Engine::new(Arc::clone(&db))),
        );

        let outcome = weekly.run_batch().await.unwrap();
        assert_eq!(outcome, BatchOutcome { sent: 2, failed: 0 });

        let mut sent = mock.sent_to.lock().await.clone();
        sent.sort();
        assert_eq!(sent, vec!["+15551110001", "+15551110002"]);

        // Both cursors moved to the sick question.
        for phone in ["+15551110001", "+15551110002"] {
            let cursor = db.get_cursor(&vault.lookup(phone)).await.unwrap();
            assert_eq!(cursor.state, ConvState::WeeklySick);
            assert!(cursor.participant_id.is_some());
        }
    }

    #[tokio::test]
    async fn delivery_failure_leaves_cursor_and_continues_batch() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let vault = vault();
        enroll_phone(&db, &vault, "+15551110001").await;
        enroll_phone(&db, &vault, "+15551110002").await;

        let mock = Arc::new(MockSender::new(vec!["+15551110001".to_string()]));
        let weekly = WeeklySender::new(
            Arc::clone(&db),
            Arc::clone(&vault),
            Arc::clone(&mock) as Arc<dyn SmsSender>,
            Arc::new(Engine::new(Arc::clone(&db))),
        );

        let outcome = weekly.run_batch().await.unwrap();
        assert_eq!(outcome, BatchOutcome { sent: 1, failed: 1 });

        // The failed participant stays idle and eligible for next run.
        let failed = db.get_cursor(&vault.lookup("+15551110001")).await.unwrap();
        assert_eq!(failed.state, ConvState::Idle);
        let ok = db.get_cursor(&vault.lookup("+15551110002")).await.unwrap();
        assert_eq!(ok.state, ConvState::WeeklySick);
    }

    #[tokio::test]
    async fn opted_out_participants_are_not_messaged() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let vault = vault();
        let pid = enroll_phone(&db, &vault, "+15551110001").await;
        db.deactivate_participant(pid).await.unwrap();

        let mock = Arc::new(MockSender::new(vec![]));
        let weekly = WeeklySender::new(
            Arc::clone(&db),
            Arc::clone(&vault),
            Arc::clone(&mock) as Arc<dyn SmsSender>,
            Arc::new(Engine::new(Arc::clone(&db))),
        );

        let outcome = weekly.run_batch().await.unwrap();
        assert_eq!(outcome, BatchOutcome::default());
        assert!(mock.sent_to.lock().await.is_empty());
    }
}
