use crate::application::ports::LocalStore;
use crate::domain::entities::{
    CacheEntry, OfflineAction, OfflinePlayer, OfflineScore, OfflineSession, RecentSession,
    SessionPatch,
};
use crate::domain::value_objects::{LocalId, ServerId, SyncStatus};
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Row, Sqlite, SqliteConnection};

use super::rows::{ActionRow, CacheRow, PlayerRow, RecentSessionRow, ScoreRow, SessionRow};

/// Sqlite-backed [`LocalStore`]. Entity + outbox pairs run inside one
/// transaction so a crash between the two writes cannot leave either
/// half dangling.
pub struct SqliteLocalStore {
    pool: Pool<Sqlite>,
}

impl SqliteLocalStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

async fn insert_session_row(
    conn: &mut SqliteConnection,
    session: &OfflineSession,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO offline_sessions (
            local_id, server_id, name, game, status, min_players, max_players,
            player_names, has_teams, offline_mode, sync_status,
            created_at, last_activity, ended_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "#,
    )
    .bind(session.local_id.as_str())
    .bind(session.server_id.as_ref().map(ServerId::as_str))
    .bind(&session.name)
    .bind(&session.game)
    .bind(session.status.as_str())
    .bind(session.min_players as i64)
    .bind(session.max_players as i64)
    .bind(serde_json::to_string(&session.player_names)?)
    .bind(session.has_teams)
    .bind(session.offline_mode)
    .bind(session.sync_status.as_str())
    .bind(session.created_at.timestamp())
    .bind(session.last_activity.timestamp())
    .bind(session.ended_at.map(|t| t.timestamp()))
    .execute(conn)
    .await?;
    Ok(())
}

async fn insert_player_row(
    conn: &mut SqliteConnection,
    player: &OfflinePlayer,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO offline_players (
            local_id, session_local_id, name, position, team, server_id, sync_status
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(player.local_id.as_str())
    .bind(player.session_local_id.as_str())
    .bind(&player.name)
    .bind(player.position as i64)
    .bind(player.team.as_deref())
    .bind(player.server_id.as_ref().map(ServerId::as_str))
    .bind(player.sync_status.as_str())
    .execute(conn)
    .await?;
    Ok(())
}

async fn insert_score_row(
    conn: &mut SqliteConnection,
    score: &OfflineScore,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO offline_scores (
            local_id, session_local_id, player_local_id, round_number, category,
            points, detail, server_id, sync_status, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(score.local_id.as_str())
    .bind(score.session_local_id.as_str())
    .bind(score.player_local_id.as_str())
    .bind(score.round_number.map(|n| n as i64))
    .bind(score.category.as_deref())
    .bind(score.points)
    .bind(
        score
            .detail
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?,
    )
    .bind(score.server_id.as_ref().map(ServerId::as_str))
    .bind(score.sync_status.as_str())
    .bind(score.created_at.timestamp())
    .execute(conn)
    .await?;
    Ok(())
}

async fn insert_action_row(
    conn: &mut SqliteConnection,
    action: &OfflineAction,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO offline_actions (
            local_id, kind, session_local_id, payload, round_number, priority,
            retry_count, max_retries, sync_status, error_message, created_at, synced_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
    )
    .bind(action.local_id.as_str())
    .bind(action.kind.as_str())
    .bind(action.session_local_id.as_str())
    .bind(serde_json::to_string(&action.payload)?)
    .bind(action.round_number.map(|n| n as i64))
    .bind(action.priority)
    .bind(action.retry_count as i64)
    .bind(action.max_retries as i64)
    .bind(action.sync_status.as_str())
    .bind(action.error_message.as_deref())
    .bind(action.created_at.timestamp())
    .bind(action.synced_at.map(|t| t.timestamp()))
    .execute(conn)
    .await?;
    Ok(())
}

#[async_trait]
impl LocalStore for SqliteLocalStore {
    async fn insert_session(
        &self,
        session: &OfflineSession,
        players: &[OfflinePlayer],
        action: &OfflineAction,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        insert_session_row(&mut *tx, session).await?;
        for player in players {
            insert_player_row(&mut *tx, player).await?;
        }
        insert_action_row(&mut *tx, action).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_session(&self, local_id: &LocalId) -> Result<Option<OfflineSession>, AppError> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT * FROM offline_sessions WHERE local_id = ?1",
        )
        .bind(local_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(OfflineSession::try_from).transpose()
    }

    async fn list_sessions(&self) -> Result<Vec<OfflineSession>, AppError> {
        let rows = sqlx::query_as::<_, SessionRow>(
            "SELECT * FROM offline_sessions ORDER BY last_activity DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(OfflineSession::try_from).collect()
    }

    async fn update_session(
        &self,
        local_id: &LocalId,
        patch: &SessionPatch,
        action: Option<&OfflineAction>,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            UPDATE offline_sessions SET
                name = COALESCE(?2, name),
                status = COALESCE(?3, status),
                ended_at = COALESCE(?4, ended_at),
                last_activity = ?5
            WHERE local_id = ?1
            "#,
        )
        .bind(local_id.as_str())
        .bind(patch.name.as_deref())
        .bind(patch.status.map(|s| s.as_str()))
        .bind(patch.ended_at.map(|t| t.timestamp()))
        .bind(Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;
        if let Some(action) = action {
            insert_action_row(&mut *tx, action).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn confirm_session(
        &self,
        local_id: &LocalId,
        server_id: &ServerId,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE offline_sessions SET
                server_id = COALESCE(server_id, ?2),
                sync_status = 'synced',
                offline_mode = 0,
                last_activity = ?3
            WHERE local_id = ?1
            "#,
        )
        .bind(local_id.as_str())
        .bind(server_id.as_str())
        .bind(at.timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_session_sync_status(
        &self,
        local_id: &LocalId,
        status: SyncStatus,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE offline_sessions SET sync_status = ?2 WHERE local_id = ?1")
            .bind(local_id.as_str())
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_session(&self, local_id: &LocalId) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        // Players, scores and actions go with the session via FK cascade.
        sqlx::query("DELETE FROM offline_sessions WHERE local_id = ?1")
            .bind(local_id.as_str())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM recent_sessions WHERE session_local_id = ?1")
            .bind(local_id.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert_player(
        &self,
        player: &OfflinePlayer,
        action: Option<&OfflineAction>,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        insert_player_row(&mut *tx, player).await?;
        if let Some(action) = action {
            insert_action_row(&mut *tx, action).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_players(&self, session: &LocalId) -> Result<Vec<OfflinePlayer>, AppError> {
        let rows = sqlx::query_as::<_, PlayerRow>(
            "SELECT * FROM offline_players WHERE session_local_id = ?1 ORDER BY position ASC",
        )
        .bind(session.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(OfflinePlayer::try_from).collect()
    }

    async fn confirm_players(&self, pairs: &[(LocalId, ServerId)]) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        for (local_id, server_id) in pairs {
            sqlx::query(
                r#"
                UPDATE offline_players SET
                    server_id = COALESCE(server_id, ?2),
                    sync_status = 'synced'
                WHERE local_id = ?1
                "#,
            )
            .bind(local_id.as_str())
            .bind(server_id.as_str())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn insert_scores(
        &self,
        scores: &[OfflineScore],
        actions: &[OfflineAction],
    ) -> Result<(), AppError> {
        let Some(first) = scores.first() else {
            return Ok(());
        };
        let mut tx = self.pool.begin().await?;
        for score in scores {
            insert_score_row(&mut *tx, score).await?;
        }
        for action in actions {
            insert_action_row(&mut *tx, action).await?;
        }
        sqlx::query("UPDATE offline_sessions SET last_activity = ?2 WHERE local_id = ?1")
            .bind(first.session_local_id.as_str())
            .bind(first.created_at.timestamp())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_scores(&self, session: &LocalId) -> Result<Vec<OfflineScore>, AppError> {
        let rows = sqlx::query_as::<_, ScoreRow>(
            "SELECT * FROM offline_scores WHERE session_local_id = ?1 ORDER BY created_at ASC",
        )
        .bind(session.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(OfflineScore::try_from).collect()
    }

    async fn list_round_scores(
        &self,
        session: &LocalId,
        round: u32,
    ) -> Result<Vec<OfflineScore>, AppError> {
        let rows = sqlx::query_as::<_, ScoreRow>(
            r#"
            SELECT * FROM offline_scores
            WHERE session_local_id = ?1 AND round_number = ?2
            ORDER BY created_at ASC
            "#,
        )
        .bind(session.as_str())
        .bind(round as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(OfflineScore::try_from).collect()
    }

    async fn mark_scores_synced(&self, score_ids: &[LocalId]) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        for id in score_ids {
            sqlx::query("UPDATE offline_scores SET sync_status = 'synced' WHERE local_id = ?1")
                .bind(id.as_str())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_pending_actions(&self) -> Result<Vec<OfflineAction>, AppError> {
        let rows = sqlx::query_as::<_, ActionRow>(
            r#"
            SELECT * FROM offline_actions
            WHERE sync_status IN ('pending', 'failed') AND retry_count < max_retries
            ORDER BY priority ASC, created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(OfflineAction::try_from).collect()
    }

    async fn get_action(&self, local_id: &LocalId) -> Result<Option<OfflineAction>, AppError> {
        let row =
            sqlx::query_as::<_, ActionRow>("SELECT * FROM offline_actions WHERE local_id = ?1")
                .bind(local_id.as_str())
                .fetch_optional(&self.pool)
                .await?;
        row.map(OfflineAction::try_from).transpose()
    }

    async fn pending_action_count(&self) -> Result<u32, AppError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS count FROM offline_actions
            WHERE sync_status IN ('pending', 'failed') AND retry_count < max_retries
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        let count: i64 = row.try_get("count").unwrap_or(0);
        Ok(count as u32)
    }

    async fn list_pending_round_actions(
        &self,
        session: &LocalId,
        round: u32,
    ) -> Result<Vec<OfflineAction>, AppError> {
        let rows = sqlx::query_as::<_, ActionRow>(
            r#"
            SELECT * FROM offline_actions
            WHERE kind = 'add_score'
              AND session_local_id = ?1
              AND round_number = ?2
              AND sync_status IN ('pending', 'syncing', 'failed')
              AND retry_count < max_retries
            ORDER BY created_at ASC
            "#,
        )
        .bind(session.as_str())
        .bind(round as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(OfflineAction::try_from).collect()
    }

    async fn mark_action_syncing(&self, local_id: &LocalId) -> Result<(), AppError> {
        sqlx::query("UPDATE offline_actions SET sync_status = 'syncing' WHERE local_id = ?1")
            .bind(local_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_actions_synced(
        &self,
        local_ids: &[LocalId],
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        for id in local_ids {
            sqlx::query(
                r#"
                UPDATE offline_actions SET
                    sync_status = 'synced',
                    synced_at = ?2,
                    error_message = NULL
                WHERE local_id = ?1
                "#,
            )
            .bind(id.as_str())
            .bind(at.timestamp())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn mark_action_failed(&self, local_id: &LocalId, error: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE offline_actions SET
                sync_status = 'failed',
                retry_count = retry_count + 1,
                error_message = ?2
            WHERE local_id = ?1
            "#,
        )
        .bind(local_id.as_str())
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_action_deferred(&self, local_id: &LocalId) -> Result<(), AppError> {
        sqlx::query("UPDATE offline_actions SET sync_status = 'pending' WHERE local_id = ?1")
            .bind(local_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn cache_put(&self, entry: &CacheEntry) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO response_cache (cache_key, payload, cached_at, ttl_seconds)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(cache_key) DO UPDATE SET
                payload = excluded.payload,
                cached_at = excluded.cached_at,
                ttl_seconds = excluded.ttl_seconds
            "#,
        )
        .bind(&entry.cache_key)
        .bind(serde_json::to_string(&entry.payload)?)
        .bind(entry.cached_at.timestamp())
        .bind(entry.ttl_seconds)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn cache_get(&self, cache_key: &str) -> Result<Option<CacheEntry>, AppError> {
        let row = sqlx::query_as::<_, CacheRow>(
            "SELECT * FROM response_cache WHERE cache_key = ?1",
        )
        .bind(cache_key)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let entry = CacheEntry::try_from(row)?;
        if entry.is_expired(Utc::now()) {
            sqlx::query("DELETE FROM response_cache WHERE cache_key = ?1")
                .bind(cache_key)
                .execute(&self.pool)
                .await?;
            return Ok(None);
        }
        Ok(Some(entry))
    }

    async fn upsert_recent_session(&self, entry: &RecentSession) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO recent_sessions (session_local_id, server_id, name, game, last_activity)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(session_local_id) DO UPDATE SET
                server_id = COALESCE(excluded.server_id, server_id),
                name = excluded.name,
                game = excluded.game,
                last_activity = excluded.last_activity
            "#,
        )
        .bind(entry.session_local_id.as_str())
        .bind(entry.server_id.as_ref().map(ServerId::as_str))
        .bind(&entry.name)
        .bind(&entry.game)
        .bind(entry.last_activity.timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_recent_session(
        &self,
        session: &LocalId,
    ) -> Result<Option<RecentSession>, AppError> {
        let row = sqlx::query_as::<_, RecentSessionRow>(
            "SELECT * FROM recent_sessions WHERE session_local_id = ?1",
        )
        .bind(session.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(RecentSession::try_from).transpose()
    }

    async fn touch_recent_session(
        &self,
        session: &LocalId,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE recent_sessions SET last_activity = ?2 WHERE session_local_id = ?1")
            .bind(session.as_str())
            .bind(at.timestamp())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_recent_sessions(&self) -> Result<Vec<RecentSession>, AppError> {
        let rows = sqlx::query_as::<_, RecentSessionRow>(
            "SELECT * FROM recent_sessions ORDER BY last_activity DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(RecentSession::try_from).collect()
    }

    async fn prune_recent_sessions(
        &self,
        cutoff: DateTime<Utc>,
        max_entries: u32,
    ) -> Result<u32, AppError> {
        let mut tx = self.pool.begin().await?;
        let expired = sqlx::query("DELETE FROM recent_sessions WHERE last_activity < ?1")
            .bind(cutoff.timestamp())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let evicted = sqlx::query(
            r#"
            DELETE FROM recent_sessions WHERE session_local_id NOT IN (
                SELECT session_local_id FROM recent_sessions
                ORDER BY last_activity DESC LIMIT ?1
            )
            "#,
        )
        .bind(max_entries as i64)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        tx.commit().await?;
        Ok((expired + evicted) as u32)
    }

    async fn remove_recent_session(&self, session: &LocalId) -> Result<(), AppError> {
        sqlx::query("DELETE FROM recent_sessions WHERE session_local_id = ?1")
            .bind(session.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear_recent_sessions(&self) -> Result<(), AppError> {
        sqlx::query("DELETE FROM recent_sessions")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
