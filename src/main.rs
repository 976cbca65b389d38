use std::str::FromStr;
use std::sync::Arc;

use flu_tracker::config::{CryptoConfig, ServerConfig, StorageConfig, TwilioConfig};
use flu_tracker::crypto::PhoneVault;
use flu_tracker::engine::Engine;
use flu_tracker::outbound::{TwilioSender, WeeklySender, spawn_cron_ticker};
use flu_tracker::store::{Database, LibSqlBackend};
use flu_tracker::webhook::{SmsRouteState, sms_routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional; real deployments set the environment directly.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // Missing key material means no code path may touch phone numbers.
    let crypto_config = CryptoConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export ENCRYPTION_KEY=<base64 of 32 random bytes>");
        std::process::exit(1);
    });
    let vault = Arc::new(PhoneVault::new(&crypto_config).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }));

    let server_config = ServerConfig::from_env()?;
    let storage = StorageConfig::from_env();
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::open(&storage).await.unwrap_or_else(|e| {
        eprintln!("Error: Failed to open databases: {e}");
        std::process::exit(1);
    }));

    let engine = Arc::new(Engine::new(Arc::clone(&db)));

    eprintln!("📋 Cold & Flu Tracker v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Webhook: http://0.0.0.0:{}/sms", server_config.port);
    eprintln!("   Identity DB: {}", storage.identity_db_path);
    eprintln!("   Health DB: {}", storage.health_db_path);

    // Optional in-process weekly ticker. Without it (or without Twilio
    // credentials) batches run externally via the send_weekly binary.
    match (&server_config.weekly_cron, TwilioConfig::from_env()) {
        (Some(expr), Some(twilio)) => {
            let schedule = cron::Schedule::from_str(expr)?;
            let weekly = Arc::new(WeeklySender::new(
                Arc::clone(&db),
                Arc::clone(&vault),
                Arc::new(TwilioSender::new(twilio)),
                Arc::clone(&engine),
            ));
            let _ticker = spawn_cron_ticker(weekly, schedule);
            eprintln!("   Weekly ticker: {expr}");
        }
        (Some(_), None) => {
            eprintln!("   Weekly ticker: disabled (no Twilio credentials)");
        }
        (None, _) => {
            eprintln!("   Weekly ticker: disabled (run send_weekly externally)");
        }
    }

    let app = sms_routes(SmsRouteState {
        engine,
        vault,
    });

    let listener =
        tokio::net::TcpListener::bind(format!("0.0.0.0:{}", server_config.port)).await?;
    tracing::info!(port = server_config.port, "SMS webhook server started");
    axum::serve(listener, app).await?;

    Ok(())
}
