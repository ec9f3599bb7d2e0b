use crate::domain::entities::{
    CacheEntry, OfflineAction, OfflinePlayer, OfflineScore, OfflineSession, RecentSession,
};
use crate::domain::value_objects::{ActionKind, LocalId, ServerId, SessionStatus, SyncStatus};
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SessionRow {
    pub local_id: String,
    pub server_id: Option<String>,
    pub name: String,
    pub game: String,
    pub status: String,
    pub min_players: i64,
    pub max_players: i64,
    pub player_names: String,
    pub has_teams: bool,
    pub offline_mode: bool,
    pub sync_status: String,
    pub created_at: i64,
    pub last_activity: i64,
    pub ended_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlayerRow {
    pub local_id: String,
    pub session_local_id: String,
    pub name: String,
    pub position: i64,
    pub team: Option<String>,
    pub server_id: Option<String>,
    pub sync_status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ScoreRow {
    pub local_id: String,
    pub session_local_id: String,
    pub player_local_id: String,
    pub round_number: Option<i64>,
    pub category: Option<String>,
    pub points: i64,
    pub detail: Option<String>,
    pub server_id: Option<String>,
    pub sync_status: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ActionRow {
    pub local_id: String,
    pub kind: String,
    pub session_local_id: String,
    pub payload: String,
    pub round_number: Option<i64>,
    pub priority: i64,
    pub retry_count: i64,
    pub max_retries: i64,
    pub sync_status: String,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub synced_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CacheRow {
    pub cache_key: String,
    pub payload: String,
    pub cached_at: i64,
    pub ttl_seconds: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RecentSessionRow {
    pub session_local_id: String,
    pub server_id: Option<String>,
    pub name: String,
    pub game: String,
    pub last_activity: i64,
}

fn datetime_from_secs(secs: i64) -> Result<DateTime<Utc>, AppError> {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| AppError::Database(format!("Timestamp out of range: {secs}")))
}

fn server_id_from_column(value: Option<String>) -> Result<Option<ServerId>, AppError> {
    value
        .map(|v| ServerId::new(v).map_err(AppError::Database))
        .transpose()
}

impl TryFrom<SessionRow> for OfflineSession {
    type Error = AppError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(OfflineSession {
            local_id: LocalId::new(row.local_id).map_err(AppError::Database)?,
            server_id: server_id_from_column(row.server_id)?,
            name: row.name,
            game: row.game,
            status: SessionStatus::from_str(&row.status).map_err(AppError::Database)?,
            min_players: row.min_players as u32,
            max_players: row.max_players as u32,
            player_names: serde_json::from_str(&row.player_names)?,
            has_teams: row.has_teams,
            offline_mode: row.offline_mode,
            sync_status: SyncStatus::from_str(&row.sync_status).map_err(AppError::Database)?,
            created_at: datetime_from_secs(row.created_at)?,
            last_activity: datetime_from_secs(row.last_activity)?,
            ended_at: row.ended_at.map(datetime_from_secs).transpose()?,
        })
    }
}

impl TryFrom<PlayerRow> for OfflinePlayer {
    type Error = AppError;

    fn try_from(row: PlayerRow) -> Result<Self, Self::Error> {
        Ok(OfflinePlayer {
            local_id: LocalId::new(row.local_id).map_err(AppError::Database)?,
            session_local_id: LocalId::new(row.session_local_id).map_err(AppError::Database)?,
            name: row.name,
            position: row.position as u32,
            team: row.team,
            server_id: server_id_from_column(row.server_id)?,
            sync_status: SyncStatus::from_str(&row.sync_status).map_err(AppError::Database)?,
        })
    }
}

impl TryFrom<ScoreRow> for OfflineScore {
    type Error = AppError;

    fn try_from(row: ScoreRow) -> Result<Self, Self::Error> {
        Ok(OfflineScore {
            local_id: LocalId::new(row.local_id).map_err(AppError::Database)?,
            session_local_id: LocalId::new(row.session_local_id).map_err(AppError::Database)?,
            player_local_id: LocalId::new(row.player_local_id).map_err(AppError::Database)?,
            round_number: row.round_number.map(|n| n as u32),
            category: row.category,
            points: row.points,
            detail: row.detail.as_deref().map(serde_json::from_str).transpose()?,
            server_id: server_id_from_column(row.server_id)?,
            sync_status: SyncStatus::from_str(&row.sync_status).map_err(AppError::Database)?,
            created_at: datetime_from_secs(row.created_at)?,
        })
    }
}

impl TryFrom<ActionRow> for OfflineAction {
    type Error = AppError;

    fn try_from(row: ActionRow) -> Result<Self, Self::Error> {
        Ok(OfflineAction {
            local_id: LocalId::new(row.local_id).map_err(AppError::Database)?,
            kind: ActionKind::from_str(&row.kind).map_err(AppError::Database)?,
            session_local_id: LocalId::new(row.session_local_id).map_err(AppError::Database)?,
            payload: serde_json::from_str(&row.payload)?,
            round_number: row.round_number.map(|n| n as u32),
            priority: row.priority,
            retry_count: row.retry_count as u32,
            max_retries: row.max_retries as u32,
            sync_status: SyncStatus::from_str(&row.sync_status).map_err(AppError::Database)?,
            error_message: row.error_message,
            created_at: datetime_from_secs(row.created_at)?,
            synced_at: row.synced_at.map(datetime_from_secs).transpose()?,
        })
    }
}

impl TryFrom<CacheRow> for CacheEntry {
    type Error = AppError;

    fn try_from(row: CacheRow) -> Result<Self, Self::Error> {
        Ok(CacheEntry {
            cache_key: row.cache_key,
            payload: serde_json::from_str(&row.payload)?,
            cached_at: datetime_from_secs(row.cached_at)?,
            ttl_seconds: row.ttl_seconds,
        })
    }
}

impl TryFrom<RecentSessionRow> for RecentSession {
    type Error = AppError;

    fn try_from(row: RecentSessionRow) -> Result<Self, Self::Error> {
        Ok(RecentSession {
            session_local_id: LocalId::new(row.session_local_id).map_err(AppError::Database)?,
            server_id: server_id_from_column(row.server_id)?,
            name: row.name,
            game: row.game,
            last_activity: datetime_from_secs(row.last_activity)?,
        })
    }
}
