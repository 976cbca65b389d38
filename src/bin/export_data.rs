//! Export the anonymized health data to `health_data.csv`.
//!
//! The file contains only de-identified data — no phone numbers, no
//! lookup keys.
//!
//! Usage: `export_data`

use std::fs::File;
use std::io::BufWriter;
use std::sync::Arc;

use flu_tracker::config::StorageConfig;
use flu_tracker::export::write_csv;
use flu_tracker::store::{Database, LibSqlBackend};

const OUTPUT_FILE: &str = "health_data.csv";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let storage = StorageConfig::from_env();
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::open(&storage).await?);

    let rows = db.export_rows().await?;
    if rows.is_empty() {
        println!("No health data found yet. Run the study for a bit first!");
        return Ok(());
    }

    let mut out = BufWriter::new(File::create(OUTPUT_FILE)?);
    let written = write_csv(&rows, &mut out)?;

    println!("Exported {written} responses to {OUTPUT_FILE}");
    println!("NOTE: this file contains no phone numbers - it's fully de-identified.");
    Ok(())
}
