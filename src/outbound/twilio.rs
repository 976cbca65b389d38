//! Outbound SMS delivery via the Twilio REST API.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tracing::debug;

use crate::config::TwilioConfig;
use crate::error::DeliveryError;

/// Outbound SMS transport seam. The weekly batch depends on this trait,
/// not on Twilio.
#[async_trait]
pub trait SmsSender: Send + Sync {
    /// Attempt delivery of one message to one E.164 address.
    async fn send(&self, to: &str, body: &str) -> Result<(), DeliveryError>;
}

/// Twilio REST implementation.
pub struct TwilioSender {
    config: TwilioConfig,
    client: reqwest::Client,
    /// Overridable for tests.
    base_url: String,
}

impl TwilioSender {
    pub fn new(config: TwilioConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            base_url: "https://api.twilio.com".to_string(),
        }
    }

    #[cfg(test)]
    fn with_base_url(config: TwilioConfig, base_url: String) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            base_url,
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.config.account_sid
        )
    }
}

#[async_trait]
impl SmsSender for TwilioSender {
    async fn send(&self, to: &str, body: &str) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(
                &self.config.account_sid,
                Some(self.config.auth_token.expose_secret()),
            )
            .form(&[
                ("To", to),
                ("From", self.config.from_number.as_str()),
                ("Body", body),
            ])
            .send()
            .await
            .map_err(|e| DeliveryError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!("Message accepted by provider");
        Ok(())
    }
}
