//! Version-tracked schema migrations.
//!
//! Each database (identity, health) has its own migration list and its own
//! `_migrations` version table. `run()` applies only the versions newer
//! than what the database has seen, in order.

use libsql::Connection;
use tracing::info;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// Identity database: participants and conversation cursors. Phone numbers
/// appear only as one-way lookup keys and sealed ciphertexts.
static IDENTITY_MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "identity_initial",
    sql: r#"
        CREATE TABLE IF NOT EXISTS participants (
            id TEXT PRIMARY KEY,
            lookup_key TEXT UNIQUE NOT NULL,
            phone_sealed TEXT NOT NULL,
            signup_date TEXT NOT NULL,
            uv_exposure INTEGER NOT NULL DEFAULT 0,
            uv_hours_per_week REAL,
            zip_code TEXT NOT NULL,
            household_size INTEGER NOT NULL,
            active INTEGER NOT NULL DEFAULT 1
        );
        CREATE INDEX IF NOT EXISTS idx_participants_active ON participants(active);

        CREATE TABLE IF NOT EXISTS conversation_state (
            lookup_key TEXT PRIMARY KEY,
            state TEXT NOT NULL,
            participant_id TEXT,
            updated_at TEXT NOT NULL
        );
    "#,
}];

/// Health database: weekly responses, keyed by participant id only.
/// The participant+week unique index makes a re-entered weekly flow unable
/// to silently overwrite or duplicate an answer.
static HEALTH_MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "health_initial",
    sql: r#"
        CREATE TABLE IF NOT EXISTS responses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            participant_id TEXT NOT NULL,
            week_start TEXT NOT NULL,
            sick INTEGER NOT NULL,
            severity INTEGER,
            symptoms TEXT,
            responded_at TEXT NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_responses_participant_week
            ON responses(participant_id, week_start);
    "#,
}];

/// Run identity-database migrations.
pub async fn migrate_identity(conn: &Connection) -> Result<(), DatabaseError> {
    run(conn, "identity", IDENTITY_MIGRATIONS).await
}

/// Run health-database migrations.
pub async fn migrate_health(conn: &Connection) -> Result<(), DatabaseError> {
    run(conn, "health", HEALTH_MIGRATIONS).await
}

async fn run(
    conn: &Connection,
    db_name: &str,
    migrations: &[Migration],
) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("create _migrations: {e}")))?;

    let current = current_version(conn).await?;

    for migration in migrations.iter().filter(|m| m.version > current) {
        conn.execute_batch(migration.sql)
            .await
            .map_err(|e| DatabaseError::Migration(format!("{}: {e}", migration.name)))?;
        conn.execute(
            "INSERT INTO _migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            libsql::params![
                migration.version,
                migration.name,
                chrono::Utc::now().to_rfc3339()
            ],
        )
        .await
        .map_err(|e| DatabaseError::Migration(format!("record {}: {e}", migration.name)))?;
        info!(db = db_name, version = migration.version, name = migration.name, "Applied migration");
    }

    Ok(())
}

async fn current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("read version: {e}")))?;
    match rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("read version: {e}")))?
    {
        Some(row) => row
            .get(0)
            .map_err(|e| DatabaseError::Migration(format!("read version: {e}"))),
        None => Ok(0),
    }
}
