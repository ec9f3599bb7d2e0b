use crate::domain::value_objects::{ActionKind, LocalId, SyncStatus};
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A durable description of one server-bound intent, written to the outbox
/// in the same transaction as the entity change it mirrors. An exhausted
/// action stays visible for diagnostics but is never drained again.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OfflineAction {
    pub local_id: LocalId,
    pub kind: ActionKind,
    pub session_local_id: LocalId,
    pub payload: serde_json::Value,
    /// Denormalized from round score payloads so the drain cycle can gather
    /// a round's sibling actions with one indexed query.
    pub round_number: Option<u32>,
    pub priority: i64,
    pub retry_count: u32,
    pub max_retries: u32,
    pub sync_status: SyncStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub synced_at: Option<DateTime<Utc>>,
}

impl OfflineAction {
    pub fn draft(
        kind: ActionKind,
        session_local_id: LocalId,
        payload: serde_json::Value,
        round_number: Option<u32>,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            local_id: LocalId::generate(),
            kind,
            session_local_id,
            payload,
            round_number,
            priority: kind.default_priority(),
            retry_count: 0,
            max_retries,
            sync_status: SyncStatus::Pending,
            error_message: None,
            created_at: now,
            synced_at: None,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }

    pub fn parse_payload<T: DeserializeOwned>(&self) -> Result<T, AppError> {
        serde_json::from_value(self.payload.clone()).map_err(AppError::from)
    }
}

/// Payload of a `create_session` action, in server-API terms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionPayload {
    pub name: String,
    pub game: String,
    pub player_names: Vec<String>,
    pub has_teams: bool,
    pub min_players: u32,
    pub max_players: u32,
}

/// Payload of a `join_session` action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinSessionPayload {
    pub player_local_id: LocalId,
    pub player_name: String,
    pub team: Option<String>,
}

/// Payload of an `add_score` action. The score row itself stays in the
/// scores collection; the payload only carries the linkage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorePayload {
    pub score_local_id: LocalId,
    pub player_local_id: LocalId,
    pub round_number: Option<u32>,
    pub category: Option<String>,
}

/// Payload of an `update_session` action: the fields to PATCH, opaque to
/// the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSessionPayload {
    pub fields: serde_json::Value,
}
