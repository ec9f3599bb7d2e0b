use crate::domain::value_objects::{LocalId, ServerId, SyncStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One scoring event: a cell of a round (round-based games) or a single
/// category entry (category-based games). Round cells are only sync-eligible
/// as the complete per-round set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OfflineScore {
    pub local_id: LocalId,
    pub session_local_id: LocalId,
    pub player_local_id: LocalId,
    pub round_number: Option<u32>,
    pub category: Option<String>,
    pub points: i64,
    /// Game-specific breakdown, opaque to the sync core.
    pub detail: Option<serde_json::Value>,
    pub server_id: Option<ServerId>,
    pub sync_status: SyncStatus,
    pub created_at: DateTime<Utc>,
}

impl OfflineScore {
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        session_local_id: LocalId,
        player_local_id: LocalId,
        round_number: Option<u32>,
        category: Option<String>,
        points: i64,
        detail: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            local_id: LocalId::generate(),
            session_local_id,
            player_local_id,
            round_number,
            category,
            points,
            detail,
            server_id: None,
            sync_status: SyncStatus::Pending,
            created_at: now,
        }
    }
}
