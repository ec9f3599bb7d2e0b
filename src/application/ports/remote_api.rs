use crate::domain::value_objects::{ServerId, SessionStatus};
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A session as the authoritative server reports it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteSession {
    pub id: ServerId,
    pub name: String,
    pub game: String,
    pub status: SessionStatus,
    pub players: Vec<RemotePlayer>,
    pub last_activity: DateTime<Utc>,
}

impl RemoteSession {
    pub fn player_names(&self) -> Vec<String> {
        self.players.iter().map(|p| p.name.clone()).collect()
    }
}

/// A player record with its server-assigned identifier. The server returns
/// these in the order the names were submitted at creation time; positional
/// reconciliation depends on that ordering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemotePlayer {
    pub id: ServerId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub name: String,
    pub game: String,
    pub player_names: Vec<String>,
    pub has_teams: bool,
    pub min_players: u32,
    pub max_players: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinSessionRequest {
    pub player_name: String,
    pub team: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundScoreEntry {
    pub player_id: ServerId,
    pub points: i64,
    pub detail: Option<serde_json::Value>,
}

/// One round as a single multi-player batch; the server does not accept
/// round cells individually.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundSubmission {
    pub round_number: u32,
    pub scores: Vec<RoundScoreEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryScoreSubmission {
    pub player_id: ServerId,
    pub category: String,
    pub points: i64,
    pub detail: Option<serde_json::Value>,
}

/// Client for the scoresheet server. Request and response bodies are JSON
/// documents whose exact shapes the server owns; this port only fixes the
/// fields the sync core itself reads.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<RemoteSession, AppError>;
    async fn list_sessions(&self) -> Result<Vec<RemoteSession>, AppError>;
    async fn session_status(&self, session_id: &ServerId) -> Result<SessionStatus, AppError>;
    async fn list_players(&self, session_id: &ServerId) -> Result<Vec<RemotePlayer>, AppError>;
    async fn join_session(
        &self,
        session_id: &ServerId,
        request: &JoinSessionRequest,
    ) -> Result<RemotePlayer, AppError>;
    async fn submit_round(
        &self,
        session_id: &ServerId,
        submission: &RoundSubmission,
    ) -> Result<(), AppError>;
    async fn submit_category_score(
        &self,
        session_id: &ServerId,
        submission: &CategoryScoreSubmission,
    ) -> Result<(), AppError>;
    async fn update_session(
        &self,
        session_id: &ServerId,
        fields: &serde_json::Value,
    ) -> Result<(), AppError>;
}
