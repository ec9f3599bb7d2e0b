use crate::application::ports::remote_api::{RemoteApi, RemoteSession};
use crate::application::ports::LocalStore;
use crate::domain::entities::{CacheEntry, OfflineSession};
use crate::domain::value_objects::{LocalId, ServerId, SessionStatus, SyncStatus};
use crate::shared::config::CacheConfig;
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const SESSION_LIST_URL: &str = "/sessions";

/// One row of the dashboard list, whether it came from the server or from
/// the local store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionOverview {
    pub local_id: Option<LocalId>,
    pub server_id: Option<ServerId>,
    pub name: String,
    pub game: String,
    pub status: SessionStatus,
    pub player_names: Vec<String>,
    pub offline_mode: bool,
    pub sync_status: SyncStatus,
    pub last_activity: DateTime<Utc>,
}

/// Produces the single session list to display: the freshly fetched server
/// list unioned with local offline sessions, deduplicated.
pub struct SessionListService {
    store: Arc<dyn LocalStore>,
    api: Arc<dyn RemoteApi>,
    list_ttl_secs: i64,
}

impl SessionListService {
    pub fn new(store: Arc<dyn LocalStore>, api: Arc<dyn RemoteApi>, config: &CacheConfig) -> Self {
        Self {
            store,
            api,
            list_ttl_secs: config.session_list_ttl_secs,
        }
    }

    pub async fn merged_sessions(&self) -> Result<Vec<SessionOverview>, AppError> {
        let server_sessions = self.fetch_server_sessions().await;
        let local_sessions = self.store.list_sessions().await?;
        Ok(merge_sessions(server_sessions, local_sessions))
    }

    /// Server list with cache fallback: a fetch failure while offline falls
    /// back to the last cached copy rather than wiping the dashboard.
    async fn fetch_server_sessions(&self) -> Vec<RemoteSession> {
        match self.api.list_sessions().await {
            Ok(sessions) => {
                let entry = CacheEntry {
                    cache_key: CacheEntry::key("GET", SESSION_LIST_URL),
                    payload: serde_json::to_value(&sessions).unwrap_or_default(),
                    cached_at: Utc::now(),
                    ttl_seconds: Some(self.list_ttl_secs),
                };
                if let Err(err) = self.store.cache_put(&entry).await {
                    tracing::warn!(
                        target: "offline::sessions",
                        error = %err,
                        "failed to cache session list"
                    );
                }
                sessions
            }
            Err(err) => {
                tracing::debug!(
                    target: "offline::sessions",
                    error = %err,
                    "session list fetch failed, falling back to cache"
                );
                self.cached_server_sessions().await
            }
        }
    }

    async fn cached_server_sessions(&self) -> Vec<RemoteSession> {
        let key = CacheEntry::key("GET", SESSION_LIST_URL);
        match self.store.cache_get(&key).await {
            Ok(Some(entry)) => serde_json::from_value(entry.payload).unwrap_or_default(),
            Ok(None) => Vec::new(),
            Err(err) => {
                tracing::warn!(
                    target: "offline::sessions",
                    error = %err,
                    "session list cache read failed"
                );
                Vec::new()
            }
        }
    }
}

/// Union of server and local sessions, newest activity first. Server rows
/// win; a local row only shows when the server does not know it yet, or the
/// list has not caught up with a just-synced create (read-after-write lag
/// must not flicker the session out of the dashboard).
pub fn merge_sessions(
    server: Vec<RemoteSession>,
    local: Vec<OfflineSession>,
) -> Vec<SessionOverview> {
    let mut merged: Vec<SessionOverview> = server.iter().map(overview_from_remote).collect();
    for session in local {
        if should_include_local(&session, &server) {
            merged.push(overview_from_local(session));
        }
    }
    merged.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
    merged
}

fn should_include_local(local: &OfflineSession, server: &[RemoteSession]) -> bool {
    if let Some(server_id) = &local.server_id {
        if server.iter().any(|s| &s.id == server_id) {
            return false;
        }
    }
    // Anything not confirmed server-side stays visible, including failed
    // and conflicted sessions; they must never silently vanish.
    if local.sync_status.is_unconfirmed() {
        return true;
    }
    // Synced but missing from the fetched list: keep it unless the list
    // holds a content duplicate. Ties resolve toward hiding.
    !server.iter().any(|s| is_content_duplicate(local, s))
}

/// Duplicate heuristic: same display name, same game, same player-name set
/// regardless of order.
fn is_content_duplicate(local: &OfflineSession, remote: &RemoteSession) -> bool {
    if local.name != remote.name || local.game != remote.game {
        return false;
    }
    let mut local_names: Vec<&str> = local.player_names.iter().map(|n| n.trim()).collect();
    let mut remote_names: Vec<String> = remote
        .players
        .iter()
        .map(|p| p.name.trim().to_string())
        .collect();
    local_names.sort_unstable();
    remote_names.sort_unstable();
    local_names.len() == remote_names.len()
        && local_names
            .iter()
            .zip(remote_names.iter())
            .all(|(a, b)| *a == b.as_str())
}

fn overview_from_remote(session: &RemoteSession) -> SessionOverview {
    SessionOverview {
        local_id: None,
        server_id: Some(session.id.clone()),
        name: session.name.clone(),
        game: session.game.clone(),
        status: session.status,
        player_names: session.player_names(),
        offline_mode: false,
        sync_status: SyncStatus::Synced,
        last_activity: session.last_activity,
    }
}

fn overview_from_local(session: OfflineSession) -> SessionOverview {
    SessionOverview {
        local_id: Some(session.local_id),
        server_id: session.server_id,
        name: session.name,
        game: session.game,
        status: session.status,
        player_names: session.player_names,
        offline_mode: session.offline_mode,
        sync_status: session.sync_status,
        last_activity: session.last_activity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::remote_api::RemotePlayer;
    use crate::domain::entities::NewOfflineSession;

    fn remote(id: &str, name: &str, game: &str, players: &[&str]) -> RemoteSession {
        RemoteSession {
            id: ServerId::parse(id).unwrap(),
            name: name.to_string(),
            game: game.to_string(),
            status: SessionStatus::Active,
            players: players
                .iter()
                .enumerate()
                .map(|(i, n)| RemotePlayer {
                    id: ServerId::parse(&format!("{id}-p{i}")).unwrap(),
                    name: n.to_string(),
                })
                .collect(),
            last_activity: Utc::now(),
        }
    }

    fn local(name: &str, game: &str, players: &[&str]) -> OfflineSession {
        OfflineSession::create(
            NewOfflineSession {
                name: name.to_string(),
                game: game.to_string(),
                player_names: players.iter().map(|s| s.to_string()).collect(),
                has_teams: false,
                min_players: 1,
                max_players: 8,
            },
            Utc::now(),
        )
    }

    #[test]
    fn pending_local_session_is_included() {
        let merged = merge_sessions(
            vec![remote("s1", "Friday Belote", "belote", &["A", "B"])],
            vec![local("Soirée Tarot", "tarot", &["A", "B", "C"])],
        );
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn local_with_matching_server_id_is_hidden() {
        let mut session = local("Soirée Tarot", "tarot", &["A", "B", "C"]);
        session.mark_synced(ServerId::parse("s1").unwrap(), Utc::now());
        let merged = merge_sessions(
            vec![remote("s1", "Soirée Tarot", "tarot", &["A", "B", "C"])],
            vec![session],
        );
        assert_eq!(merged.len(), 1);
        assert!(merged[0].local_id.is_none());
    }

    #[test]
    fn synced_local_missing_from_list_survives_read_after_write_lag() {
        let mut session = local("Soirée Tarot", "tarot", &["A", "B", "C"]);
        session.mark_synced(ServerId::parse("s9").unwrap(), Utc::now());
        let merged = merge_sessions(Vec::new(), vec![session]);
        assert_eq!(merged.len(), 1);
        assert!(!merged[0].offline_mode);
    }

    #[test]
    fn content_duplicate_is_deduplicated_regardless_of_player_order() {
        let mut session = local("Soirée Tarot", "tarot", &["C", "A", "B"]);
        // Synced under an id the stale list does not carry yet.
        session.mark_synced(ServerId::parse("s-new").unwrap(), Utc::now());
        let merged = merge_sessions(
            vec![remote("s-old", "Soirée Tarot", "tarot", &["A", "B", "C"])],
            vec![session],
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].server_id, Some(ServerId::parse("s-old").unwrap()));
    }

    #[test]
    fn distinct_session_with_same_name_but_other_players_is_kept() {
        let mut session = local("Soirée Tarot", "tarot", &["X", "Y", "Z"]);
        session.mark_synced(ServerId::parse("s-new").unwrap(), Utc::now());
        let merged = merge_sessions(
            vec![remote("s-old", "Soirée Tarot", "tarot", &["A", "B", "C"])],
            vec![session],
        );
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn merged_list_is_sorted_by_last_activity_descending() {
        let mut older = remote("s1", "Old", "tarot", &["A"]);
        older.last_activity = Utc::now() - chrono::Duration::hours(2);
        let newer = local("New", "tarot", &["B"]);
        let merged = merge_sessions(vec![older], vec![newer]);
        assert_eq!(merged[0].name, "New");
        assert_eq!(merged[1].name, "Old");
    }

    mod cache_fallback {
        use super::*;
        use crate::application::ports::remote_api::{
            CategoryScoreSubmission, CreateSessionRequest, JoinSessionRequest, RoundSubmission,
        };
        use crate::infrastructure::offline::SqliteLocalStore;
        use sqlx::sqlite::SqlitePoolOptions;
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Mutex;

        struct FlakyApi {
            offline: AtomicBool,
            sessions: Mutex<Vec<RemoteSession>>,
        }

        impl FlakyApi {
            fn serving(sessions: Vec<RemoteSession>) -> Self {
                Self {
                    offline: AtomicBool::new(false),
                    sessions: Mutex::new(sessions),
                }
            }

            fn guard(&self) -> Result<(), AppError> {
                if self.offline.load(Ordering::SeqCst) {
                    Err(AppError::Network("offline".to_string()))
                } else {
                    Ok(())
                }
            }
        }

        #[async_trait::async_trait]
        impl RemoteApi for FlakyApi {
            async fn create_session(
                &self,
                _request: &CreateSessionRequest,
            ) -> Result<RemoteSession, AppError> {
                Err(AppError::Internal("not scripted".to_string()))
            }

            async fn list_sessions(&self) -> Result<Vec<RemoteSession>, AppError> {
                self.guard()?;
                Ok(self.sessions.lock().unwrap().clone())
            }

            async fn session_status(
                &self,
                _session_id: &ServerId,
            ) -> Result<SessionStatus, AppError> {
                Err(AppError::Internal("not scripted".to_string()))
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

        #[tokio::test]
        async fn fetch_failure_falls_back_to_the_cached_list() {
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .connect("sqlite::memory:")
                .await
                .unwrap();
            sqlx::migrate!("./migrations").run(&pool).await.unwrap();
            let store: Arc<dyn LocalStore> = Arc::new(SqliteLocalStore::new(pool));

            let api = Arc::new(FlakyApi::serving(vec![remote(
                "s1",
                "Friday Belote",
                "belote",
                &["A", "B"],
            )]));
            let service = SessionListService::new(
                Arc::clone(&store),
                Arc::clone(&api) as Arc<dyn RemoteApi>,
                &crate::shared::config::CacheConfig {
                    session_list_ttl_secs: 300,
                },
            );

            // Online fetch primes the cache.
            let online = service.merged_sessions().await.unwrap();
            assert_eq!(online.len(), 1);

            // The connection drops; the cached copy keeps the dashboard
            // populated.
            api.offline.store(true, Ordering::SeqCst);
            let offline = service.merged_sessions().await.unwrap();
            assert_eq!(offline.len(), 1);
            assert_eq!(offline[0].name, "Friday Belote");
        }
    }
}
