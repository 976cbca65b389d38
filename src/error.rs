//! Error types for the tracker.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),
}

/// Configuration-related errors. All of these are startup-fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Privacy-boundary errors.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Key material must be 32 bytes of base64, got {0}")]
    BadKeyMaterial(String),

    #[error("Ciphertext is malformed: {0}")]
    MalformedCiphertext(String),

    #[error("Decryption failed (wrong key or tampered ciphertext)")]
    DecryptionFailed,

    #[error("Decrypted phone number is not valid UTF-8")]
    NotUtf8,
}

/// Outbound SMS delivery errors. Recoverable at the batch level: counted,
/// never retried within the same run.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Send request failed: {0}")]
    Request(String),

    #[error("Provider rejected the message: status {status}, body {body}")]
    Rejected { status: u16, body: String },
}

/// Result type alias for the tracker.
pub type Result<T> = std::result::Result<T, Error>;
