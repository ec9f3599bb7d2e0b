use crate::domain::entities::{
    CacheEntry, OfflineAction, OfflinePlayer, OfflineScore, OfflineSession, RecentSession,
    SessionPatch,
};
use crate::domain::value_objects::{LocalId, ServerId, SyncStatus};
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Durable, transactional storage for the offline collections. Methods that
/// take an entity together with an [`OfflineAction`] must apply both in one
/// transaction: readers never observe an entity change without its outbox
/// record or the other way round.
#[async_trait]
pub trait LocalStore: Send + Sync {
    // Sessions
    async fn insert_session(
        &self,
        session: &OfflineSession,
        players: &[OfflinePlayer],
        action: &OfflineAction,
    ) -> Result<(), AppError>;
    async fn get_session(&self, local_id: &LocalId) -> Result<Option<OfflineSession>, AppError>;
    async fn list_sessions(&self) -> Result<Vec<OfflineSession>, AppError>;
    async fn update_session(
        &self,
        local_id: &LocalId,
        patch: &SessionPatch,
        action: Option<&OfflineAction>,
    ) -> Result<(), AppError>;
    /// Writes the server identifier, flips `sync_status` to synced and
    /// `offline_mode` off. The server id is write-once: a second call with a
    /// different id leaves the stored one untouched.
    async fn confirm_session(
        &self,
        local_id: &LocalId,
        server_id: &ServerId,
        at: DateTime<Utc>,
    ) -> Result<(), AppError>;
    async fn set_session_sync_status(
        &self,
        local_id: &LocalId,
        status: SyncStatus,
    ) -> Result<(), AppError>;
    /// Cascades to players, scores, queued actions and the continuity row.
    async fn delete_session(&self, local_id: &LocalId) -> Result<(), AppError>;

    // Players
    async fn insert_player(
        &self,
        player: &OfflinePlayer,
        action: Option<&OfflineAction>,
    ) -> Result<(), AppError>;
    /// Ordered by `position` ascending, the order players were entered.
    async fn list_players(&self, session: &LocalId) -> Result<Vec<OfflinePlayer>, AppError>;
    /// Attaches server ids to the given players and marks them synced, all
    /// in one transaction. Partial mappings must never be observable.
    async fn confirm_players(&self, pairs: &[(LocalId, ServerId)]) -> Result<(), AppError>;

    // Scores
    async fn insert_scores(
        &self,
        scores: &[OfflineScore],
        actions: &[OfflineAction],
    ) -> Result<(), AppError>;
    async fn list_scores(&self, session: &LocalId) -> Result<Vec<OfflineScore>, AppError>;
    async fn list_round_scores(
        &self,
        session: &LocalId,
        round: u32,
    ) -> Result<Vec<OfflineScore>, AppError>;
    async fn mark_scores_synced(&self, score_ids: &[LocalId]) -> Result<(), AppError>;

    // Outbox actions
    /// Actions still worth attempting: `pending` or `failed` with retries
    /// left, ordered by priority ascending then creation time ascending.
    async fn list_pending_actions(&self) -> Result<Vec<OfflineAction>, AppError>;
    async fn get_action(&self, local_id: &LocalId) -> Result<Option<OfflineAction>, AppError>;
    async fn pending_action_count(&self) -> Result<u32, AppError>;
    /// Still-pending `add_score` actions for one session round.
    async fn list_pending_round_actions(
        &self,
        session: &LocalId,
        round: u32,
    ) -> Result<Vec<OfflineAction>, AppError>;
    async fn mark_action_syncing(&self, local_id: &LocalId) -> Result<(), AppError>;
    async fn mark_actions_synced(
        &self,
        local_ids: &[LocalId],
        at: DateTime<Utc>,
    ) -> Result<(), AppError>;
    /// Records the failure and consumes one retry.
    async fn mark_action_failed(&self, local_id: &LocalId, error: &str) -> Result<(), AppError>;
    /// Puts an attempted action back to `pending` without consuming a retry
    /// (a dependency was not ready, not a failure).
    async fn mark_action_deferred(&self, local_id: &LocalId) -> Result<(), AppError>;

    // Response cache
    async fn cache_put(&self, entry: &CacheEntry) -> Result<(), AppError>;
    /// Returns `None` for missing and for expired entries; expired rows are
    /// dropped on read.
    async fn cache_get(&self, cache_key: &str) -> Result<Option<CacheEntry>, AppError>;

    // Continuity
    async fn upsert_recent_session(&self, entry: &RecentSession) -> Result<(), AppError>;
    async fn get_recent_session(
        &self,
        session: &LocalId,
    ) -> Result<Option<RecentSession>, AppError>;
    async fn touch_recent_session(
        &self,
        session: &LocalId,
        at: DateTime<Utc>,
    ) -> Result<(), AppError>;
    /// Newest first.
    async fn list_recent_sessions(&self) -> Result<Vec<RecentSession>, AppError>;
    /// Drops entries older than `cutoff` and evicts oldest entries beyond
    /// `max_entries`. Returns how many rows went away.
    async fn prune_recent_sessions(
        &self,
        cutoff: DateTime<Utc>,
        max_entries: u32,
    ) -> Result<u32, AppError>;
    async fn remove_recent_session(&self, session: &LocalId) -> Result<(), AppError>;
    async fn clear_recent_sessions(&self) -> Result<(), AppError>;
}
