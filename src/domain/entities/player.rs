use crate::domain::value_objects::{LocalId, ServerId, SyncStatus};
use serde::{Deserialize, Serialize};

/// A named participant in exactly one session. `position` is assigned in
/// entry order and is unique within the session; the sync engine later pairs
/// local and server players by this index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OfflinePlayer {
    pub local_id: LocalId,
    pub session_local_id: LocalId,
    pub name: String,
    pub position: u32,
    pub team: Option<String>,
    pub server_id: Option<ServerId>,
    pub sync_status: SyncStatus,
}

impl OfflinePlayer {
    pub fn create(
        session_local_id: LocalId,
        name: String,
        position: u32,
        team: Option<String>,
    ) -> Self {
        Self {
            local_id: LocalId::generate(),
            session_local_id,
            name,
            position,
            team,
            server_id: None,
            sync_status: SyncStatus::Pending,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.server_id.is_some()
    }
}
