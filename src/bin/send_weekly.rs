//! One-shot weekly batch sender, meant to run on a schedule (e.g.
//! Sunday morning via cron).
//!
//! Usage: `send_weekly`

use std::sync::Arc;

use flu_tracker::config::{CryptoConfig, StorageConfig, TwilioConfig};
use flu_tracker::crypto::PhoneVault;
use flu_tracker::engine::Engine;
use flu_tracker::outbound::{TwilioSender, WeeklySender};
use flu_tracker::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let crypto_config = CryptoConfig::from_env()?;
    let vault = Arc::new(PhoneVault::new(&crypto_config)?);
    let twilio = TwilioConfig::require_from_env()?;

    let storage = StorageConfig::from_env();
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::open(&storage).await?);
    let engine = Arc::new(Engine::new(Arc::clone(&db)));

    let weekly = WeeklySender::new(db, vault, Arc::new(TwilioSender::new(twilio)), engine);
    let outcome = weekly.run_batch().await?;

    println!("Sent {} texts, {} errors", outcome.sent, outcome.failed);
    Ok(())
}
