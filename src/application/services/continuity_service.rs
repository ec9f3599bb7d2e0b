use crate::application::ports::remote_api::RemoteApi;
use crate::application::ports::LocalStore;
use crate::domain::entities::{OfflineSession, RecentSession};
use crate::domain::value_objects::{LocalId, SessionStatus};
use crate::shared::config::ContinuityConfig;
use crate::shared::error::AppError;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Tracks which sessions this device recently touched, for "rejoin?"
/// prompts. Best-effort by design: a storage failure degrades to "no
/// recent sessions" and must never block gameplay.
pub struct ContinuityService {
    store: Arc<dyn LocalStore>,
    api: Arc<dyn RemoteApi>,
    config: ContinuityConfig,
}

impl ContinuityService {
    pub fn new(
        store: Arc<dyn LocalStore>,
        api: Arc<dyn RemoteApi>,
        config: ContinuityConfig,
    ) -> Self {
        Self { store, api, config }
    }

    pub async fn save_session(&self, session: &OfflineSession) -> Result<(), AppError> {
        let entry = RecentSession {
            session_local_id: session.local_id.clone(),
            server_id: session.server_id.clone(),
            name: session.name.clone(),
            game: session.game.clone(),
            last_activity: Utc::now(),
        };
        if let Err(err) = self.store.upsert_recent_session(&entry).await {
            tracing::warn!(
                target: "offline::continuity",
                error = %err,
                "failed to save recent session"
            );
        }
        Ok(())
    }

    pub async fn get_session(&self, session: &LocalId) -> Result<Option<RecentSession>, AppError> {
        match self.store.get_recent_session(session).await {
            Ok(Some(entry)) if self.is_expired(&entry, Utc::now()) => {
                let _ = self.store.remove_recent_session(session).await;
                Ok(None)
            }
            Ok(entry) => Ok(entry),
            Err(err) => {
                tracing::warn!(
                    target: "offline::continuity",
                    error = %err,
                    "recent session lookup failed"
                );
                Ok(None)
            }
        }
    }

    pub async fn update_activity(&self, session: &LocalId) -> Result<(), AppError> {
        if let Err(err) = self.store.touch_recent_session(session, Utc::now()).await {
            tracing::warn!(
                target: "offline::continuity",
                error = %err,
                "failed to refresh recent session activity"
            );
        }
        Ok(())
    }

    /// Most recent first. Expired entries and anything beyond the retained
    /// maximum are purged lazily here, not by a background timer.
    pub async fn list_recent(&self, limit: usize) -> Result<Vec<RecentSession>, AppError> {
        let cutoff = Utc::now() - Duration::days(self.config.retention_days);
        if let Err(err) = self
            .store
            .prune_recent_sessions(cutoff, self.config.max_entries)
            .await
        {
            tracing::warn!(
                target: "offline::continuity",
                error = %err,
                "recent session pruning failed"
            );
        }
        match self.store.list_recent_sessions().await {
            Ok(mut entries) => {
                entries.truncate(limit);
                Ok(entries)
            }
            Err(err) => {
                tracing::warn!(
                    target: "offline::continuity",
                    error = %err,
                    "recent session listing failed, treating as empty"
                );
                Ok(Vec::new())
            }
        }
    }

    pub async fn remove(&self, session: &LocalId) -> Result<(), AppError> {
        self.store.remove_recent_session(session).await
    }

    pub async fn clear_all(&self) -> Result<(), AppError> {
        self.store.clear_recent_sessions().await
    }

    /// Purely local recency check: no server round-trip.
    pub fn is_reconnectable(&self, entry: &RecentSession, now: DateTime<Utc>) -> bool {
        now - entry.last_activity <= Duration::hours(self.config.reconnect_window_hours)
    }

    /// Local recency first; when the session is known server-side, a status
    /// check may additionally veto. A failed check never vetoes; the local
    /// answer stands.
    pub async fn verify_reconnectable(&self, entry: &RecentSession) -> bool {
        if !self.is_reconnectable(entry, Utc::now()) {
            return false;
        }
        let Some(server_id) = &entry.server_id else {
            return true;
        };
        match self.api.session_status(server_id).await {
            Ok(SessionStatus::Completed) | Ok(SessionStatus::Cancelled) => false,
            Ok(_) => true,
            Err(err) => {
                tracing::debug!(
                    target: "offline::continuity",
                    error = %err,
                    "session status check failed, keeping local eligibility"
                );
                true
            }
        }
    }

    fn is_expired(&self, entry: &RecentSession, now: DateTime<Utc>) -> bool {
        now - entry.last_activity > Duration::days(self.config.retention_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::remote_api::{
        CategoryScoreSubmission, CreateSessionRequest, JoinSessionRequest, RemotePlayer,
        RemoteSession, RoundSubmission,
    };
    use crate::domain::entities::NewOfflineSession;
    use crate::domain::value_objects::ServerId;
    use crate::infrastructure::offline::SqliteLocalStore;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::SqlitePool;
    use std::sync::Mutex;

    /// Only `session_status` matters here; the rest is unreachable.
    struct StatusApi {
        status: Mutex<Result<SessionStatus, String>>,
    }

    impl StatusApi {
        fn with_status(status: SessionStatus) -> Self {
            Self {
                status: Mutex::new(Ok(status)),
            }
        }

        fn unreachable_server() -> Self {
            Self {
                status: Mutex::new(Err("connection refused".to_string())),
            }
        }
    }

    #[async_trait::async_trait]
    impl RemoteApi for StatusApi {
        async fn create_session(
            &self,
            _request: &CreateSessionRequest,
        ) -> Result<RemoteSession, AppError> {
            Err(AppError::Internal("not scripted".to_string()))
        }

        async fn list_sessions(&self) -> Result<Vec<RemoteSession>, AppError> {
            Err(AppError::Internal("not scripted".to_string()))
        }

        async fn session_status(
            &self,
            _session_id: &ServerId,
        ) -> Result<SessionStatus, AppError> {
            self.status
                .lock()
                .unwrap()
                .clone()
                .map_err(AppError::Network)
        }

        async fn list_players(
            &self,
            _session_id: &ServerId,
        ) -> Result<Vec<RemotePlayer>, AppError> {
            Err(AppError::Internal("not scripted".to_string()))
        }

        async fn join_session(
            &self,
            _session_id: &ServerId,
            _request: &JoinSessionRequest,
        ) -> Result<RemotePlayer, AppError> {
            Err(AppError::Internal("not scripted".to_string()))
        }

        async fn submit_round(
            &self,
            _session_id: &ServerId,
            _submission: &RoundSubmission,
        ) -> Result<(), AppError> {
            Err(AppError::Internal("not scripted".to_string()))
        }

        async fn submit_category_score(
            &self,
            _session_id: &ServerId,
            _submission: &CategoryScoreSubmission,
        ) -> Result<(), AppError> {
            Err(AppError::Internal("not scripted".to_string()))
        }

        async fn update_session(
            &self,
            _session_id: &ServerId,
            _fields: &serde_json::Value,
        ) -> Result<(), AppError> {
            Err(AppError::Internal("not scripted".to_string()))
        }
    }

    async fn setup(api: Arc<dyn RemoteApi>) -> (ContinuityService, Arc<dyn LocalStore>, SqlitePool) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();

        let store: Arc<dyn LocalStore> = Arc::new(SqliteLocalStore::new(pool.clone()));
        let service = ContinuityService::new(
            Arc::clone(&store),
            api,
            ContinuityConfig {
                retention_days: 7,
                reconnect_window_hours: 24,
                max_entries: 3,
            },
        );
        (service, store, pool)
    }

    fn sample_session(name: &str) -> OfflineSession {
        OfflineSession::create(
            NewOfflineSession {
                name: name.to_string(),
                game: "tarot".to_string(),
                player_names: vec!["A".into(), "B".into()],
                has_teams: false,
                min_players: 1,
                max_players: 8,
            },
            Utc::now(),
        )
    }

    fn aged_entry(session: &OfflineSession, age: Duration) -> RecentSession {
        RecentSession {
            session_local_id: session.local_id.clone(),
            server_id: session.server_id.clone(),
            name: session.name.clone(),
            game: session.game.clone(),
            last_activity: Utc::now() - age,
        }
    }

    #[tokio::test]
    async fn expired_entries_vanish_from_list_and_lookup() {
        let api: Arc<dyn RemoteApi> = Arc::new(StatusApi::with_status(SessionStatus::Active));
        let (service, store, _) = setup(api).await;

        let fresh = sample_session("Fresh");
        let stale = sample_session("Stale");
        service.save_session(&fresh).await.unwrap();
        store
            .upsert_recent_session(&aged_entry(&stale, Duration::days(8)))
            .await
            .unwrap();

        let recent = service.list_recent(10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].name, "Fresh");

        assert!(service.get_session(&stale.local_id).await.unwrap().is_none());
        // The read-triggered cleanup removed the row for good.
        assert!(store
            .get_recent_session(&stale.local_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn list_recent_caps_retained_entries_oldest_out() {
        let api: Arc<dyn RemoteApi> = Arc::new(StatusApi::with_status(SessionStatus::Active));
        let (service, store, _) = setup(api).await;

        for i in 0..5 {
            let session = sample_session(&format!("Session {i}"));
            store
                .upsert_recent_session(&aged_entry(&session, Duration::minutes(i)))
                .await
                .unwrap();
        }

        let recent = service.list_recent(10).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].name, "Session 0");
        assert_eq!(recent[2].name, "Session 2");
    }

    #[tokio::test]
    async fn broken_storage_degrades_to_no_sessions() {
        let api: Arc<dyn RemoteApi> = Arc::new(StatusApi::with_status(SessionStatus::Active));
        let (service, _, pool) = setup(api).await;

        sqlx::query("DROP TABLE recent_sessions")
            .execute(&pool)
            .await
            .unwrap();

        assert!(service.list_recent(10).await.unwrap().is_empty());
        let session = sample_session("Anything");
        assert!(service.get_session(&session.local_id).await.unwrap().is_none());
        // Saves swallow the failure too.
        service.save_session(&session).await.unwrap();
    }

    #[tokio::test]
    async fn reconnection_window_is_a_pure_local_check() {
        let api: Arc<dyn RemoteApi> = Arc::new(StatusApi::with_status(SessionStatus::Active));
        let (service, _, _) = setup(api).await;

        let session = sample_session("Evening game");
        let now = Utc::now();
        assert!(service.is_reconnectable(&aged_entry(&session, Duration::hours(2)), now));
        assert!(!service.is_reconnectable(&aged_entry(&session, Duration::hours(25)), now));
    }

    #[tokio::test]
    async fn completed_server_session_vetoes_reconnection() {
        let api: Arc<dyn RemoteApi> = Arc::new(StatusApi::with_status(SessionStatus::Completed));
        let (service, _, _) = setup(api).await;

        let mut session = sample_session("Finished game");
        session.mark_synced(ServerId::parse("srv-1").unwrap(), Utc::now());
        let entry = aged_entry(&session, Duration::hours(1));
        assert!(!service.verify_reconnectable(&entry).await);
    }

    #[tokio::test]
    async fn unreachable_server_does_not_veto_reconnection() {
        let api: Arc<dyn RemoteApi> = Arc::new(StatusApi::unreachable_server());
        let (service, _, _) = setup(api).await;

        let mut session = sample_session("Evening game");
        session.mark_synced(ServerId::parse("srv-1").unwrap(), Utc::now());
        let entry = aged_entry(&session, Duration::hours(1));
        assert!(service.verify_reconnectable(&entry).await);
    }
}
