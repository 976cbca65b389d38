//! Unified `Database` trait — single async interface for all persistence.
//!
//! Covers the three store contracts (identity, conversation cursors,
//! weekly responses) behind one seam so the engine and the batch jobs
//! depend on a trait object, not a backend.

use async_trait::async_trait;
use uuid::Uuid;

use crate::crypto::LookupKey;
use crate::engine::state::ConvState;
use crate::error::DatabaseError;
use crate::model::{ActiveParticipant, Cursor, NewParticipant, NewResponse, Participant};

/// One exported row: a response joined with non-identifying participant
/// attributes. Never contains a phone number or lookup key.
#[derive(Debug, Clone)]
pub struct ExportRow {
    pub participant_id: Uuid,
    pub week_start: String,
    pub sick: bool,
    pub severity: Option<i64>,
    pub symptoms: Option<String>,
    pub responded_at: String,
    pub uv_exposure: Option<bool>,
    pub uv_hours_per_week: Option<f64>,
    pub zip_code: Option<String>,
    pub household_size: Option<i64>,
}

/// Backend-agnostic persistence trait.
#[async_trait]
pub trait Database: Send + Sync {
    // ── Participants (identity store) ───────────────────────────────

    /// Create a participant at signup completion. Returns the new id.
    /// Fails on a duplicate lookup key (one participant per phone).
    async fn create_participant(&self, new: &NewParticipant) -> Result<Uuid, DatabaseError>;

    /// Find a participant by lookup key.
    async fn get_participant(
        &self,
        key: &LookupKey,
    ) -> Result<Option<Participant>, DatabaseError>;

    /// Flip a participant to inactive. The only mutation participants ever
    /// see; there is no reactivation path.
    async fn deactivate_participant(&self, id: Uuid) -> Result<(), DatabaseError>;

    /// All active participants with their sealed delivery addresses, for
    /// the weekly batch.
    async fn active_participants(&self) -> Result<Vec<ActiveParticipant>, DatabaseError>;

    // ── Conversation cursors ────────────────────────────────────────

    /// Load the cursor for a contact. A missing row reads back as the
    /// default (`Unknown`, no participant bound).
    async fn get_cursor(&self, key: &LookupKey) -> Result<Cursor, DatabaseError>;

    /// Upsert the cursor for a contact, atomically.
    ///
    /// Contract: `participant_id = None` means "leave any stored id in
    /// place", never "clear it". Binding an id once is permanent.
    async fn set_cursor(
        &self,
        key: &LookupKey,
        state: &ConvState,
        participant_id: Option<Uuid>,
    ) -> Result<(), DatabaseError>;

    // ── Weekly responses (health store) ─────────────────────────────

    /// Append one response row for a participant's week. Returns `false`
    /// when a row for that participant+week already exists (first answer
    /// wins; the row is never mutated).
    async fn record_response(&self, response: &NewResponse) -> Result<bool, DatabaseError>;

    /// All responses joined with non-identifying participant attributes,
    /// ordered by week then participant. Read-only, for export.
    async fn export_rows(&self) -> Result<Vec<ExportRow>, DatabaseError>;
}
