use crate::domain::value_objects::{LocalId, ServerId, SessionStatus, SyncStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A game instance created or touched while the device was (or might have
/// been) offline. `local_id` never changes; `server_id` is written once by
/// the sync engine and never overwritten afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OfflineSession {
    pub local_id: LocalId,
    pub server_id: Option<ServerId>,
    pub name: String,
    pub game: String,
    pub status: SessionStatus,
    pub min_players: u32,
    pub max_players: u32,
    pub player_names: Vec<String>,
    pub has_teams: bool,
    pub offline_mode: bool,
    pub sync_status: SyncStatus,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl OfflineSession {
    pub fn create(draft: NewOfflineSession, now: DateTime<Utc>) -> Self {
        Self {
            local_id: LocalId::generate(),
            server_id: None,
            name: draft.name,
            game: draft.game,
            status: SessionStatus::Waiting,
            min_players: draft.min_players,
            max_players: draft.max_players,
            player_names: draft.player_names,
            has_teams: draft.has_teams,
            offline_mode: true,
            sync_status: SyncStatus::Pending,
            created_at: now,
            last_activity: now,
            ended_at: None,
        }
    }

    /// Flips the record to server-confirmed. `offline_mode` only ever goes
    /// false here, together with the synced status.
    pub fn mark_synced(&mut self, server_id: ServerId, synced_at: DateTime<Utc>) {
        self.server_id.get_or_insert(server_id);
        self.sync_status = SyncStatus::Synced;
        self.offline_mode = false;
        self.last_activity = synced_at;
    }
}

/// What the caller provides when starting a session locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOfflineSession {
    pub name: String,
    pub game: String,
    pub player_names: Vec<String>,
    pub has_teams: bool,
    pub min_players: u32,
    pub max_players: u32,
}

/// Partial update applied to a stored session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionPatch {
    pub name: Option<String>,
    pub status: Option<SessionStatus>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl SessionPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.status.is_none() && self.ended_at.is_none()
    }
}
