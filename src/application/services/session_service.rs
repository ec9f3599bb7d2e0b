use crate::application::ports::LocalStore;
use crate::domain::entities::{
    CreateSessionPayload, JoinSessionPayload, NewOfflineSession, OfflineAction, OfflinePlayer,
    OfflineScore, OfflineSession, RecentSession, ScorePayload, SessionPatch, UpdateSessionPayload,
};
use crate::domain::value_objects::{ActionKind, LocalId};
use crate::shared::config::SyncConfig;
use crate::shared::error::AppError;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

/// One cell of a round: a player and the points they take for it.
#[derive(Debug, Clone)]
pub struct RoundEntry {
    pub player_local_id: LocalId,
    pub points: i64,
    pub detail: Option<serde_json::Value>,
}

/// The write path of the offline core. Every mutation lands as an entity
/// change plus an outbox action in one store transaction: the entity is what
/// the UI reads back immediately, the action is what the sync engine later
/// replays against the server.
pub struct SessionService {
    store: Arc<dyn LocalStore>,
    max_retries: u32,
}

impl SessionService {
    pub fn new(store: Arc<dyn LocalStore>, config: &SyncConfig) -> Self {
        Self {
            store,
            max_retries: config.max_retries,
        }
    }

    pub async fn create_offline_session(
        &self,
        draft: NewOfflineSession,
    ) -> Result<OfflineSession, AppError> {
        let player_count = draft.player_names.len() as u32;
        if player_count == 0 {
            return Err(AppError::ValidationError(
                "A session needs at least one player".to_string(),
            ));
        }
        if player_count < draft.min_players || player_count > draft.max_players {
            return Err(AppError::ValidationError(format!(
                "Player count {} outside allowed range {}..={}",
                player_count, draft.min_players, draft.max_players
            )));
        }
        if draft.player_names.iter().any(|n| n.trim().is_empty()) {
            return Err(AppError::ValidationError(
                "Player names cannot be empty".to_string(),
            ));
        }

        let now = Utc::now();
        let session = OfflineSession::create(draft, now);
        let players: Vec<OfflinePlayer> = session
            .player_names
            .iter()
            .enumerate()
            .map(|(position, name)| {
                OfflinePlayer::create(
                    session.local_id.clone(),
                    name.clone(),
                    position as u32,
                    None,
                )
            })
            .collect();

        let payload = CreateSessionPayload {
            name: session.name.clone(),
            game: session.game.clone(),
            player_names: session.player_names.clone(),
            has_teams: session.has_teams,
            min_players: session.min_players,
            max_players: session.max_players,
        };
        let action = OfflineAction::draft(
            ActionKind::CreateSession,
            session.local_id.clone(),
            serde_json::to_value(&payload)?,
            None,
            self.max_retries,
            now,
        );

        self.store.insert_session(&session, &players, &action).await?;
        self.remember(&session).await;

        Ok(session)
    }

    /// Record a full round: one score per player, queued as one action per
    /// cell. The drain cycle reassembles the set and ships it as a single
    /// batch.
    pub async fn record_round(
        &self,
        session_local_id: &LocalId,
        round_number: u32,
        entries: Vec<RoundEntry>,
    ) -> Result<Vec<OfflineScore>, AppError> {
        if entries.is_empty() {
            return Err(AppError::ValidationError(
                "A round needs at least one score".to_string(),
            ));
        }
        let session = self.require_session(session_local_id).await?;

        let now = Utc::now();
        let mut scores = Vec::with_capacity(entries.len());
        let mut actions = Vec::with_capacity(entries.len());
        for entry in entries {
            let score = OfflineScore::create(
                session.local_id.clone(),
                entry.player_local_id.clone(),
                Some(round_number),
                None,
                entry.points,
                entry.detail,
                now,
            );
            let payload = ScorePayload {
                score_local_id: score.local_id.clone(),
                player_local_id: entry.player_local_id,
                round_number: Some(round_number),
                category: None,
            };
            actions.push(OfflineAction::draft(
                ActionKind::AddScore,
                session.local_id.clone(),
                serde_json::to_value(&payload)?,
                Some(round_number),
                self.max_retries,
                now,
            ));
            scores.push(score);
        }

        self.store.insert_scores(&scores, &actions).await?;
        self.touch(&session.local_id).await;

        Ok(scores)
    }

    pub async fn record_category_score(
        &self,
        session_local_id: &LocalId,
        player_local_id: &LocalId,
        category: &str,
        points: i64,
        detail: Option<serde_json::Value>,
    ) -> Result<OfflineScore, AppError> {
        let session = self.require_session(session_local_id).await?;

        let now = Utc::now();
        let score = OfflineScore::create(
            session.local_id.clone(),
            player_local_id.clone(),
            None,
            Some(category.to_string()),
            points,
            detail,
            now,
        );
        let payload = ScorePayload {
            score_local_id: score.local_id.clone(),
            player_local_id: player_local_id.clone(),
            round_number: None,
            category: Some(category.to_string()),
        };
        let action = OfflineAction::draft(
            ActionKind::AddScore,
            session.local_id.clone(),
            serde_json::to_value(&payload)?,
            None,
            self.max_retries,
            now,
        );

        self.store
            .insert_scores(std::slice::from_ref(&score), std::slice::from_ref(&action))
            .await?;
        self.touch(&session.local_id).await;

        Ok(score)
    }

    /// Join a server session mirrored locally: the player row is visible
    /// right away, the join request goes out with the next drain.
    pub async fn join_session(
        &self,
        session_local_id: &LocalId,
        player_name: &str,
        team: Option<String>,
    ) -> Result<OfflinePlayer, AppError> {
        if player_name.trim().is_empty() {
            return Err(AppError::ValidationError(
                "Player name cannot be empty".to_string(),
            ));
        }
        let session = self.require_session(session_local_id).await?;
        let existing = self.store.list_players(&session.local_id).await?;
        let position = existing.len() as u32;

        let player = OfflinePlayer::create(
            session.local_id.clone(),
            player_name.to_string(),
            position,
            team.clone(),
        );
        let payload = JoinSessionPayload {
            player_local_id: player.local_id.clone(),
            player_name: player_name.to_string(),
            team,
        };
        let action = OfflineAction::draft(
            ActionKind::JoinSession,
            session.local_id.clone(),
            serde_json::to_value(&payload)?,
            None,
            self.max_retries,
            Utc::now(),
        );

        self.store.insert_player(&player, Some(&action)).await?;
        self.touch(&session.local_id).await;

        Ok(player)
    }

    pub async fn update_session(
        &self,
        session_local_id: &LocalId,
        patch: SessionPatch,
    ) -> Result<(), AppError> {
        if patch.is_empty() {
            return Ok(());
        }
        let session = self.require_session(session_local_id).await?;

        let mut fields = serde_json::Map::new();
        if let Some(name) = &patch.name {
            fields.insert("name".to_string(), json!(name));
        }
        if let Some(status) = patch.status {
            fields.insert("status".to_string(), json!(status.as_str()));
        }
        if let Some(ended_at) = patch.ended_at {
            fields.insert("ended_at".to_string(), json!(ended_at.timestamp()));
        }
        let payload = UpdateSessionPayload {
            fields: serde_json::Value::Object(fields),
        };
        let action = OfflineAction::draft(
            ActionKind::UpdateSession,
            session.local_id.clone(),
            serde_json::to_value(&payload)?,
            None,
            self.max_retries,
            Utc::now(),
        );

        self.store
            .update_session(&session.local_id, &patch, Some(&action))
            .await?;
        self.touch(&session.local_id).await;

        Ok(())
    }

    /// Removes the session and everything hanging off it: players, scores,
    /// queued actions, continuity record.
    pub async fn delete_session(&self, session_local_id: &LocalId) -> Result<(), AppError> {
        self.store.delete_session(session_local_id).await
    }

    pub async fn get_session(
        &self,
        session_local_id: &LocalId,
    ) -> Result<Option<OfflineSession>, AppError> {
        self.store.get_session(session_local_id).await
    }

    pub async fn list_players(
        &self,
        session_local_id: &LocalId,
    ) -> Result<Vec<OfflinePlayer>, AppError> {
        self.store.list_players(session_local_id).await
    }

    pub async fn list_scores(
        &self,
        session_local_id: &LocalId,
    ) -> Result<Vec<OfflineScore>, AppError> {
        self.store.list_scores(session_local_id).await
    }

    async fn require_session(
        &self,
        session_local_id: &LocalId,
    ) -> Result<OfflineSession, AppError> {
        self.store
            .get_session(session_local_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Session {session_local_id}")))
    }

    // Continuity bookkeeping is an optimization; its failure never blocks
    // the primary write.
    async fn remember(&self, session: &OfflineSession) {
        let entry = RecentSession {
            session_local_id: session.local_id.clone(),
            server_id: session.server_id.clone(),
            name: session.name.clone(),
            game: session.game.clone(),
            last_activity: session.last_activity,
        };
        if let Err(err) = self.store.upsert_recent_session(&entry).await {
            tracing::warn!(
                target: "offline::session",
                error = %err,
                "failed to record recent session"
            );
        }
    }

    async fn touch(&self, session_local_id: &LocalId) {
        if let Err(err) = self
            .store
            .touch_recent_session(session_local_id, Utc::now())
            .await
        {
            tracing::warn!(
                target: "offline::session",
                error = %err,
                "failed to refresh recent session activity"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::SyncStatus;
    use crate::infrastructure::offline::SqliteLocalStore;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup() -> (SessionService, Arc<dyn LocalStore>) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();

        let store: Arc<dyn LocalStore> = Arc::new(SqliteLocalStore::new(pool));
        let service = SessionService::new(Arc::clone(&store), &SyncConfig::default());
        (service, store)
    }

    fn tarot_draft() -> NewOfflineSession {
        NewOfflineSession {
            name: "Soirée Tarot".to_string(),
            game: "tarot".to_string(),
            player_names: vec!["A".into(), "B".into(), "C".into(), "D".into()],
            has_teams: false,
            min_players: 3,
            max_players: 5,
        }
    }

    #[tokio::test]
    async fn create_session_writes_entity_players_and_action_together() {
        let (service, store) = setup().await;

        let session = service.create_offline_session(tarot_draft()).await.unwrap();
        assert!(session.offline_mode);
        assert_eq!(session.sync_status, SyncStatus::Pending);

        let players = store.list_players(&session.local_id).await.unwrap();
        assert_eq!(players.len(), 4);
        let positions: Vec<u32> = players.iter().map(|p| p.position).collect();
        assert_eq!(positions, vec![0, 1, 2, 3]);

        let pending = store.list_pending_actions().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, ActionKind::CreateSession);
        assert_eq!(pending[0].session_local_id, session.local_id);

        let recent = store.list_recent_sessions().await.unwrap();
        assert_eq!(recent.len(), 1);
    }

    #[tokio::test]
    async fn create_session_rejects_out_of_bounds_rosters() {
        let (service, _) = setup().await;

        let mut draft = tarot_draft();
        draft.player_names = vec!["A".into()];
        assert!(matches!(
            service.create_offline_session(draft).await,
            Err(AppError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn record_round_queues_one_action_per_cell() {
        let (service, store) = setup().await;
        let session = service.create_offline_session(tarot_draft()).await.unwrap();
        let players = store.list_players(&session.local_id).await.unwrap();

        let entries: Vec<RoundEntry> = players
            .iter()
            .map(|p| RoundEntry {
                player_local_id: p.local_id.clone(),
                points: 25,
                detail: None,
            })
            .collect();
        let scores = service
            .record_round(&session.local_id, 1, entries)
            .await
            .unwrap();
        assert_eq!(scores.len(), 4);

        let pending = store.list_pending_actions().await.unwrap();
        // create_session plus one add_score per player
        assert_eq!(pending.len(), 5);
        let round_actions = store
            .list_pending_round_actions(&session.local_id, 1)
            .await
            .unwrap();
        assert_eq!(round_actions.len(), 4);
    }

    #[tokio::test]
    async fn create_session_drains_before_scores() {
        let (service, store) = setup().await;
        let session = service.create_offline_session(tarot_draft()).await.unwrap();
        let players = store.list_players(&session.local_id).await.unwrap();

        service
            .record_round(
                &session.local_id,
                1,
                vec![RoundEntry {
                    player_local_id: players[0].local_id.clone(),
                    points: 10,
                    detail: None,
                }],
            )
            .await
            .unwrap();

        let pending = store.list_pending_actions().await.unwrap();
        assert_eq!(pending[0].kind, ActionKind::CreateSession);
        assert!(pending[1..]
            .iter()
            .all(|action| action.kind == ActionKind::AddScore));
    }

    #[tokio::test]
    async fn delete_session_cascades_to_queue() {
        let (service, store) = setup().await;
        let session = service.create_offline_session(tarot_draft()).await.unwrap();

        service.delete_session(&session.local_id).await.unwrap();

        assert!(store.get_session(&session.local_id).await.unwrap().is_none());
        assert!(store.list_pending_actions().await.unwrap().is_empty());
        assert!(store.list_recent_sessions().await.unwrap().is_empty());
    }
}
