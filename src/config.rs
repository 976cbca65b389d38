//! Environment-driven configuration.
//!
//! Everything is read once at startup and passed into components
//! explicitly. Key material lives in [`secrecy::SecretString`] so it never
//! shows up in debug output.

use secrecy::SecretString;

use crate::error::ConfigError;

/// Storage locations for the two databases.
///
/// Identity data (participants, conversation cursors) and health data
/// (weekly responses) are kept in separate files on purpose.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub identity_db_path: String,
    pub health_db_path: String,
}

impl StorageConfig {
    pub fn from_env() -> Self {
        Self {
            identity_db_path: std::env::var("IDENTITY_DB_PATH")
                .unwrap_or_else(|_| "data/identity.db".to_string()),
            health_db_path: std::env::var("HEALTH_DB_PATH")
                .unwrap_or_else(|_| "data/health.db".to_string()),
        }
    }
}

/// Symmetric key material for the phone-number privacy boundary.
///
/// Missing key material is startup-fatal for every code path that touches
/// phone numbers.
#[derive(Clone)]
pub struct CryptoConfig {
    /// Base64-encoded 32-byte master key.
    pub encryption_key: SecretString,
}

impl CryptoConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let key = std::env::var("ENCRYPTION_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("ENCRYPTION_KEY".to_string()))?;
        if key.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "ENCRYPTION_KEY".to_string(),
                message: "value is empty".to_string(),
            });
        }
        Ok(Self {
            encryption_key: SecretString::from(key),
        })
    }
}

/// Twilio credentials for outbound sends.
#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: SecretString,
    /// The study's sending number, E.164.
    pub from_number: String,
}

impl TwilioConfig {
    /// Read Twilio credentials from the environment. Returns `None` when the
    /// account SID is unset so the webhook server can run without outbound
    /// capability (e.g. local development).
    pub fn from_env() -> Option<Self> {
        let account_sid = std::env::var("TWILIO_ACCOUNT_SID").ok()?;
        let auth_token = std::env::var("TWILIO_AUTH_TOKEN").unwrap_or_default();
        let from_number = std::env::var("TWILIO_PHONE_NUMBER").unwrap_or_default();
        Some(Self {
            account_sid,
            auth_token: SecretString::from(auth_token),
            from_number,
        })
    }

    /// Like `from_env`, but missing credentials are an error. Used by the
    /// weekly sender, which cannot do anything without them.
    pub fn require_from_env() -> Result<Self, ConfigError> {
        let account_sid = std::env::var("TWILIO_ACCOUNT_SID")
            .map_err(|_| ConfigError::MissingEnvVar("TWILIO_ACCOUNT_SID".to_string()))?;
        let auth_token = std::env::var("TWILIO_AUTH_TOKEN")
            .map_err(|_| ConfigError::MissingEnvVar("TWILIO_AUTH_TOKEN".to_string()))?;
        let from_number = std::env::var("TWILIO_PHONE_NUMBER")
            .map_err(|_| ConfigError::MissingEnvVar("TWILIO_PHONE_NUMBER".to_string()))?;
        Ok(Self {
            account_sid,
            auth_token: SecretString::from(auth_token),
            from_number,
        })
    }
}

/// Webhook server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Optional cron expression for the in-process weekly ticker
    /// (e.g. `0 0 9 * * Sun *`). Unset means batches are run externally
    /// via the `send_weekly` binary.
    pub weekly_cron: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port: u16 = std::env::var("SMS_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5000);

        let weekly_cron = std::env::var("WEEKLY_CRON").ok().filter(|s| !s.is_empty());
        if let Some(ref expr) = weekly_cron {
            use std::str::FromStr;
            cron::Schedule::from_str(expr).map_err(|e| ConfigError::InvalidValue {
                key: "WEEKLY_CRON".to_string(),
                message: format!("invalid cron expression: {e}"),
            })?;
        }

        Ok(Self { port, weekly_cron })
    }
}
