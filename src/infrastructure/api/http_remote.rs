use crate::application::ports::remote_api::{
    CategoryScoreSubmission, CreateSessionRequest, JoinSessionRequest, RemoteApi, RemotePlayer,
    RemoteSession, RoundSubmission,
};
use crate::domain::value_objects::{ServerId, SessionStatus};
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::str::FromStr;

use super::error::{ApiError, ApiResult};

/// HTTP adapter for the scoresheet server. Owns no sync logic; the engine
/// decides what to send and when.
#[derive(Clone)]
pub struct HttpRemoteApi {
    client: Client,
    base_url: String,
    bearer_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionDoc {
    id: String,
    name: String,
    game: String,
    status: String,
    #[serde(default)]
    players: Vec<PlayerDoc>,
    last_activity: i64,
}

#[derive(Debug, Deserialize)]
struct PlayerDoc {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct StatusDoc {
    status: String,
}

impl HttpRemoteApi {
    pub fn new(base_url: impl Into<String>, bearer_token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bearer_token,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.request(method, url);
        match &self.bearer_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn check(response: Response) -> ApiResult<Response> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status { status, body });
        }
        Ok(response)
    }

    async fn send_json<T: serde::Serialize>(
        &self,
        method: Method,
        path: &str,
        body: &T,
    ) -> ApiResult<Response> {
        let response = self.request(method, path).json(body).send().await?;
        Self::check(response).await
    }
}

fn session_from_doc(doc: SessionDoc) -> ApiResult<RemoteSession> {
    let players = doc
        .players
        .into_iter()
        .map(player_from_doc)
        .collect::<ApiResult<Vec<_>>>()?;
    Ok(RemoteSession {
        id: ServerId::new(doc.id).map_err(ApiError::Decode)?,
        name: doc.name,
        game: doc.game,
        status: SessionStatus::from_str(&doc.status).map_err(ApiError::Decode)?,
        players,
        last_activity: DateTime::<Utc>::from_timestamp(doc.last_activity, 0)
            .ok_or_else(|| ApiError::Decode("last_activity out of range".to_string()))?,
    })
}

fn player_from_doc(doc: PlayerDoc) -> ApiResult<RemotePlayer> {
    Ok(RemotePlayer {
        id: ServerId::new(doc.id).map_err(ApiError::Decode)?,
        name: doc.name,
    })
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<RemoteSession, AppError> {
        let response = self.send_json(Method::POST, "/sessions", request).await?;
        let doc: SessionDoc = response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(session_from_doc(doc)?)
    }

    async fn list_sessions(&self) -> Result<Vec<RemoteSession>, AppError> {
        let response = self.request(Method::GET, "/sessions").send().await;
        let response = Self::check(response.map_err(ApiError::from)?).await?;
        let docs: Vec<SessionDoc> = response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        let sessions = docs
            .into_iter()
            .map(session_from_doc)
            .collect::<ApiResult<Vec<_>>>()?;
        Ok(sessions)
    }

    async fn session_status(&self, session_id: &ServerId) -> Result<SessionStatus, AppError> {
        let path = format!("/sessions/{}/status", session_id);
        let response = self.request(Method::GET, &path).send().await;
        let response = Self::check(response.map_err(ApiError::from)?).await?;
        let doc: StatusDoc = response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(SessionStatus::from_str(&doc.status).map_err(ApiError::Decode)?)
    }

    async fn list_players(&self, session_id: &ServerId) -> Result<Vec<RemotePlayer>, AppError> {
        let path = format!("/sessions/{}/players", session_id);
        let response = self.request(Method::GET, &path).send().await;
        let response = Self::check(response.map_err(ApiError::from)?).await?;
        let docs: Vec<PlayerDoc> = response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        let players = docs
            .into_iter()
            .map(player_from_doc)
            .collect::<ApiResult<Vec<_>>>()?;
        Ok(players)
    }

    async fn join_session(
        &self,
        session_id: &ServerId,
        request: &JoinSessionRequest,
    ) -> Result<RemotePlayer, AppError> {
        let path = format!("/sessions/{}/join", session_id);
        let response = self.send_json(Method::POST, &path, request).await?;
        let doc: PlayerDoc = response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(player_from_doc(doc)?)
    }

    async fn submit_round(
        &self,
        session_id: &ServerId,
        submission: &RoundSubmission,
    ) -> Result<(), AppError> {
        let path = format!("/sessions/{}/rounds", session_id);
        self.send_json(Method::POST, &path, submission).await?;
        Ok(())
    }

    async fn submit_category_score(
        &self,
        session_id: &ServerId,
        submission: &CategoryScoreSubmission,
    ) -> Result<(), AppError> {
        let path = format!("/sessions/{}/scores", session_id);
        self.send_json(Method::POST, &path, submission).await?;
        Ok(())
    }

    async fn update_session(
        &self,
        session_id: &ServerId,
        fields: &serde_json::Value,
    ) -> Result<(), AppError> {
        let path = format!("/sessions/{}", session_id);
        self.send_json(Method::PATCH, &path, fields).await?;
        Ok(())
    }
}
