//! libSQL backend — async `Database` trait implementation.
//!
//! Two local database files: identity (participants, cursors) and health
//! (responses), so identity and health data never share a file. The only
//! join across them (export) is done in memory.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::crypto::{LookupKey, SealedPhone};
use crate::engine::state::ConvState;
use crate::error::DatabaseError;
use crate::model::{ActiveParticipant, Cursor, NewParticipant, NewResponse, Participant};
use crate::store::migrations;
use crate::store::traits::{Database, ExportRow};

/// libSQL database backend holding one connection per database.
///
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    identity: Connection,
    health: Connection,
}

impl LibSqlBackend {
    /// Open (or create) both database files and run migrations.
    pub async fn open(storage: &StorageConfig) -> Result<Self, DatabaseError> {
        let identity = open_local(Path::new(&storage.identity_db_path)).await?;
        let health = open_local(Path::new(&storage.health_db_path)).await?;

        let backend = Self { identity, health };
        backend.init_schema().await?;
        info!(
            identity = %storage.identity_db_path,
            health = %storage.health_db_path,
            "Databases opened"
        );
        Ok(backend)
    }

    /// In-memory databases (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let identity = open_memory().await?;
        let health = open_memory().await?;
        let backend = Self { identity, health };
        backend.init_schema().await?;
        Ok(backend)
    }

    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::migrate_identity(&self.identity).await?;
        migrations::migrate_health(&self.health).await?;
        Ok(())
    }
}

async fn open_local(path: &Path) -> Result<Connection, DatabaseError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }
    }

    let db = libsql::Builder::new_local(path)
        .build()
        .await
        .map_err(|e| DatabaseError::Connection(format!("Failed to open database: {e}")))?;
    db.connect()
        .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))
}

async fn open_memory() -> Result<Connection, DatabaseError> {
    let db = libsql::Builder::new_local(":memory:")
        .build()
        .await
        .map_err(|e| DatabaseError::Connection(format!("Failed to create in-memory database: {e}")))?;
    db.connect()
        .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))
}

// ── Row mapping helpers ─────────────────────────────────────────────

fn parse_uuid(s: &str, context: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::Serialization(format!("{context}: {e}")))
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn row_to_participant(row: &libsql::Row) -> Result<Participant, DatabaseError> {
    let id_str: String = row
        .get(0)
        .map_err(|e| DatabaseError::Query(format!("participant id: {e}")))?;
    let lookup_key: String = row
        .get(1)
        .map_err(|e| DatabaseError::Query(format!("participant lookup_key: {e}")))?;
    let phone_sealed: String = row
        .get(2)
        .map_err(|e| DatabaseError::Query(format!("participant phone_sealed: {e}")))?;
    let signup_str: String = row
        .get(3)
        .map_err(|e| DatabaseError::Query(format!("participant signup_date: {e}")))?;
    let uv_exposure: i64 = row
        .get(4)
        .map_err(|e| DatabaseError::Query(format!("participant uv_exposure: {e}")))?;
    let uv_hours: Option<f64> = row.get(5).ok();
    let zip_code: String = row
        .get(6)
        .map_err(|e| DatabaseError::Query(format!("participant zip_code: {e}")))?;
    let household_size: i64 = row
        .get(7)
        .map_err(|e| DatabaseError::Query(format!("participant household_size: {e}")))?;
    let active: i64 = row
        .get(8)
        .map_err(|e| DatabaseError::Query(format!("participant active: {e}")))?;

    Ok(Participant {
        id: parse_uuid(&id_str, "participant id")?,
        lookup_key: LookupKey::from_stored(lookup_key),
        sealed_phone: SealedPhone::from_stored(phone_sealed),
        signup_date: parse_datetime(&signup_str),
        uv_exposure: uv_exposure != 0,
        uv_hours_per_week: uv_hours,
        zip_code,
        household_size,
        active: active != 0,
    })
}

const PARTICIPANT_COLUMNS: &str = "id, lookup_key, phone_sealed, signup_date, uv_exposure, uv_hours_per_week, zip_code, household_size, active";

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn create_participant(&self, new: &NewParticipant) -> Result<Uuid, DatabaseError> {
        let id = Uuid::new_v4();
        self.identity
            .execute(
                "INSERT INTO participants (id, lookup_key, phone_sealed, signup_date,
                    uv_exposure, uv_hours_per_week, zip_code, household_size, active)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1)",
                params![
                    id.to_string(),
                    new.lookup_key.as_str(),
                    new.sealed_phone.as_str(),
                    Utc::now().to_rfc3339(),
                    new.uv_exposure as i64,
                    new.uv_hours_per_week,
                    new.zip_code.as_str(),
                    new.household_size,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_participant: {e}")))?;

        debug!(participant_id = %id, "Participant created");
        Ok(id)
    }

    async fn get_participant(
        &self,
        key: &LookupKey,
    ) -> Result<Option<Participant>, DatabaseError> {
        let mut rows = self
            .identity
            .query(
                &format!("SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE lookup_key = ?1"),
                params![key.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_participant: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("get_participant: {e}")))?
        {
            Some(row) => Ok(Some(row_to_participant(&row)?)),
            None => Ok(None),
        }
    }

    async fn deactivate_participant(&self, id: Uuid) -> Result<(), DatabaseError> {
        let changed = self
            .identity
            .execute(
                "UPDATE participants SET active = 0 WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("deactivate_participant: {e}")))?;

        if changed == 0 {
            return Err(DatabaseError::NotFound {
                entity: "participant".to_string(),
                id: id.to_string(),
            });
        }
        debug!(participant_id = %id, "Participant deactivated");
        Ok(())
    }

    async fn active_participants(&self) -> Result<Vec<ActiveParticipant>, DatabaseError> {
        let mut rows = self
            .identity
            .query(
                "SELECT id, lookup_key, phone_sealed FROM participants WHERE active = 1",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("active_participants: {e}")))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("active_participants: {e}")))?
        {
            let id_str: String = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("active id: {e}")))?;
            let lookup_key: String = row
                .get(1)
                .map_err(|e| DatabaseError::Query(format!("active lookup_key: {e}")))?;
            let phone_sealed: String = row
                .get(2)
                .map_err(|e| DatabaseError::Query(format!("active phone_sealed: {e}")))?;
            out.push(ActiveParticipant {
                id: parse_uuid(&id_str, "active participant id")?,
                lookup_key: LookupKey::from_stored(lookup_key),
                sealed_phone: SealedPhone::from_stored(phone_sealed),
            });
        }
        Ok(out)
    }

    async fn get_cursor(&self, key: &LookupKey) -> Result<Cursor, DatabaseError> {
        let mut rows = self
            .identity
            .query(
                "SELECT state, participant_id FROM conversation_state WHERE lookup_key = ?1",
                params![key.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_cursor: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("get_cursor: {e}")))?
        {
            Some(row) => {
                let state_json: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("cursor state: {e}")))?;
                let participant_id: Option<String> = row.get(1).ok();
                let state: ConvState = serde_json::from_str(&state_json)
                    .map_err(|e| DatabaseError::Serialization(format!("cursor state: {e}")))?;
                let participant_id = match participant_id {
                    Some(s) => Some(parse_uuid(&s, "cursor participant_id")?),
                    None => None,
                };
                Ok(Cursor {
                    state,
                    participant_id,
                })
            }
            None => Ok(Cursor::default()),
        }
    }

    async fn set_cursor(
        &self,
        key: &LookupKey,
        state: &ConvState,
        participant_id: Option<Uuid>,
    ) -> Result<(), DatabaseError> {
        let state_json = serde_json::to_string(state)
            .map_err(|e| DatabaseError::Serialization(format!("cursor state: {e}")))?;
        let pid = match participant_id {
            Some(id) => libsql::Value::Text(id.to_string()),
            None => libsql::Value::Null,
        };

        // COALESCE keeps a previously bound participant id when the new
        // write omits one. Binding is one-way by contract.
        self.identity
            .execute(
                "INSERT INTO conversation_state (lookup_key, state, participant_id, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(lookup_key) DO UPDATE SET
                     state = excluded.state,
                     participant_id = COALESCE(excluded.participant_id, conversation_state.participant_id),
                     updated_at = excluded.updated_at",
                params![
                    key.as_str(),
                    state_json,
                    pid,
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_cursor: {e}")))?;

        debug!(state = state.name(), "Cursor updated");
        Ok(())
    }

    async fn record_response(&self, response: &NewResponse) -> Result<bool, DatabaseError> {
        let severity = match response.severity {
            Some(s) => libsql::Value::Integer(s),
            None => libsql::Value::Null,
        };
        let symptoms = match &response.symptoms {
            Some(s) => libsql::Value::Text(s.clone()),
            None => libsql::Value::Null,
        };

        // First answer for a week wins; a duplicate insert is a no-op.
        let changed = self
            .health
            .execute(
                "INSERT OR IGNORE INTO responses
                    (participant_id, week_start, sick, severity, symptoms, responded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    response.participant_id.to_string(),
                    response.week_start.to_string(),
                    response.sick as i64,
                    severity,
                    symptoms,
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("record_response: {e}")))?;

        debug!(
            participant_id = %response.participant_id,
            week = %response.week_start,
            recorded = changed > 0,
            "Response recorded"
        );
        Ok(changed > 0)
    }

    async fn export_rows(&self) -> Result<Vec<ExportRow>, DatabaseError> {
        // Responses live in the health DB, participant attributes in the
        // identity DB; join in memory keyed by participant id.
        let mut attrs: std::collections::HashMap<String, (bool, Option<f64>, String, i64)> =
            std::collections::HashMap::new();
        let mut rows = self
            .identity
            .query(
                "SELECT id, uv_exposure, uv_hours_per_week, zip_code, household_size
                 FROM participants",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("export participants: {e}")))?;
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("export participants: {e}")))?
        {
            let id: String = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("export id: {e}")))?;
            let uv: i64 = row
                .get(1)
                .map_err(|e| DatabaseError::Query(format!("export uv: {e}")))?;
            let hours: Option<f64> = row.get(2).ok();
            let zip: String = row
                .get(3)
                .map_err(|e| DatabaseError::Query(format!("export zip: {e}")))?;
            let household: i64 = row
                .get(4)
                .map_err(|e| DatabaseError::Query(format!("export household: {e}")))?;
            attrs.insert(id, (uv != 0, hours, zip, household));
        }

        let mut rows = self
            .health
            .query(
                "SELECT participant_id, week_start, sick, severity, symptoms, responded_at
                 FROM responses ORDER BY week_start, participant_id",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("export responses: {e}")))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("export responses: {e}")))?
        {
            let pid_str: String = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("export pid: {e}")))?;
            let week_start: String = row
                .get(1)
                .map_err(|e| DatabaseError::Query(format!("export week: {e}")))?;
            let sick: i64 = row
                .get(2)
                .map_err(|e| DatabaseError::Query(format!("export sick: {e}")))?;
            let severity: Option<i64> = row.get(3).ok();
            let symptoms: Option<String> = row.get(4).ok();
            let responded_at: String = row
                .get(5)
                .map_err(|e| DatabaseError::Query(format!("export responded_at: {e}")))?;

            let joined = attrs.get(&pid_str);
            out.push(ExportRow {
                participant_id: parse_uuid(&pid_str, "export participant id")?,
                week_start,
                sick: sick != 0,
                severity,
                symptoms,
                responded_at,
                uv_exposure: joined.map(|(uv, ..)| *uv),
                uv_hours_per_week: joined.and_then(|(_, hours, ..)| *hours),
                zip_code: joined.map(|(_, _, zip, _)| zip.clone()),
                household_size: joined.map(|(.., household)| *household),
            });
        }
        Ok(out)
    }
}
