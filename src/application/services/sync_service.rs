use crate::application::ports::remote_api::{
    CategoryScoreSubmission, CreateSessionRequest, JoinSessionRequest, RemoteApi, RemotePlayer,
    RoundScoreEntry, RoundSubmission,
};
use crate::application::ports::{LocalStore, NetworkMonitor, SyncAuthorization};
use crate::domain::entities::{
    CreateSessionPayload, JoinSessionPayload, OfflineAction, ScorePayload, UpdateSessionPayload,
};
use crate::domain::value_objects::{ActionKind, LocalId, ServerId, SyncStatus};
use crate::shared::config::SyncConfig;
use crate::shared::error::AppError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;

/// What one drain cycle did, broadcast to subscribers after every cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncReport {
    pub attempted: u32,
    pub synced: u32,
    pub failed: u32,
    pub deferred: u32,
    /// Actions still waiting after the cycle.
    pub pending: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleOutcome {
    /// Queue empty or drained cleanly.
    Idle,
    /// At least one action failed; come back sooner.
    HadFailures,
    /// The cycle itself blew up; back off.
    Errored,
}

enum ActionOutcome {
    /// `n` actions were confirmed (a round batch confirms its whole set).
    Synced(u32),
    /// A dependency was not ready. Not a failure: no retry is consumed and
    /// the next cycle re-checks.
    Deferred,
    Failed(String),
}

struct Runner {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Background engine that drains the outbox while the device is online.
///
/// Cycles are strictly sequential: one action at a time, one cycle at a
/// time. The round-batching handler depends on that: it re-reads "still
/// pending" state mid-cycle and must not race a second drain.
pub struct SyncService {
    store: Arc<dyn LocalStore>,
    api: Arc<dyn RemoteApi>,
    auth: Arc<dyn SyncAuthorization>,
    config: SyncConfig,
    events: broadcast::Sender<SyncReport>,
    cycle_gate: Mutex<()>,
    runner: Mutex<Option<Runner>>,
}

impl SyncService {
    pub fn new(
        store: Arc<dyn LocalStore>,
        api: Arc<dyn RemoteApi>,
        auth: Arc<dyn SyncAuthorization>,
        config: SyncConfig,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(16);
        Arc::new(Self {
            store,
            api,
            auth,
            config,
            events,
            cycle_gate: Mutex::new(()),
            runner: Mutex::new(None),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncReport> {
        self.events.subscribe()
    }

    pub async fn pending_count(&self) -> Result<u32, AppError> {
        self.store.pending_action_count().await
    }

    /// Idempotent: calling while the loop is already running is a no-op.
    pub async fn start(self: &Arc<Self>) {
        let mut runner = self.runner.lock().await;
        if let Some(existing) = runner.as_ref() {
            if !existing.handle.is_finished() {
                return;
            }
        }
        let (stop_tx, stop_rx) = watch::channel(false);
        let service = Arc::clone(self);
        let handle = tokio::spawn(service.run_loop(stop_rx));
        *runner = Some(Runner { stop_tx, handle });
        tracing::info!(target: "offline::sync", "sync engine started");
    }

    /// Cancels the scheduled next cycle. An in-flight cycle finishes
    /// naturally so no action is abandoned mid-request.
    pub async fn stop(&self) {
        let mut runner = self.runner.lock().await;
        if let Some(runner) = runner.take() {
            let _ = runner.stop_tx.send(true);
            tracing::info!(target: "offline::sync", "sync engine stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.runner
            .lock()
            .await
            .as_ref()
            .map(|r| !r.handle.is_finished())
            .unwrap_or(false)
    }

    /// Run one drain cycle right now, regardless of the schedule.
    pub async fn force_sync(&self) -> Result<SyncReport, AppError> {
        let _guard = self.cycle_gate.lock().await;
        let report = self.drain_once().await?;
        let _ = self.events.send(report.clone());
        Ok(report)
    }

    /// Starts and stops the engine as connectivity comes and goes.
    pub fn spawn_monitor_bridge(
        self: &Arc<Self>,
        monitor: Arc<dyn NetworkMonitor>,
    ) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut rx = monitor.subscribe();
            if service.config.auto_sync && *rx.borrow() {
                service.start().await;
            }
            while rx.changed().await.is_ok() {
                let online = *rx.borrow();
                if online {
                    service.start().await;
                } else {
                    service.stop().await;
                }
            }
        })
    }

    async fn run_loop(self: Arc<Self>, mut stop_rx: watch::Receiver<bool>) {
        loop {
            let outcome = self.run_cycle().await;
            if *stop_rx.borrow() {
                break;
            }
            let delay = match outcome {
                CycleOutcome::Idle => self.config.idle_delay_secs,
                CycleOutcome::HadFailures => self.config.retry_delay_secs,
                CycleOutcome::Errored => self.config.error_delay_secs,
            };
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(delay)) => {}
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }
    }

    async fn run_cycle(&self) -> CycleOutcome {
        let _guard = self.cycle_gate.lock().await;
        match self.drain_once().await {
            Ok(report) => {
                let outcome = if report.failed > 0 {
                    CycleOutcome::HadFailures
                } else {
                    CycleOutcome::Idle
                };
                let _ = self.events.send(report);
                outcome
            }
            Err(err) => {
                tracing::error!(target: "offline::sync", error = %err, "drain cycle aborted");
                CycleOutcome::Errored
            }
        }
    }

    async fn drain_once(&self) -> Result<SyncReport, AppError> {
        let mut report = SyncReport::default();
        if !self.auth.can_sync() {
            report.pending = self.store.pending_action_count().await?;
            return Ok(report);
        }

        let snapshot = self.store.list_pending_actions().await?;
        for action in snapshot {
            // A round batch earlier in this cycle may have confirmed this
            // one already; work from current state, not the snapshot.
            let Some(current) = self.store.get_action(&action.local_id).await? else {
                continue;
            };
            if current.sync_status == SyncStatus::Synced || current.is_exhausted() {
                continue;
            }

            report.attempted += 1;
            self.store.mark_action_syncing(&current.local_id).await?;
            match self.handle_action(&current).await? {
                ActionOutcome::Synced(count) => {
                    report.synced += count;
                }
                ActionOutcome::Deferred => {
                    self.store.mark_action_deferred(&current.local_id).await?;
                    report.deferred += 1;
                    tracing::debug!(
                        target: "offline::sync",
                        action = %current.local_id,
                        kind = %current.kind,
                        "dependency not ready, deferring"
                    );
                }
                ActionOutcome::Failed(message) => {
                    self.store
                        .mark_action_failed(&current.local_id, &message)
                        .await?;
                    report.failed += 1;
                    tracing::warn!(
                        target: "offline::sync",
                        action = %current.local_id,
                        kind = %current.kind,
                        error = %message,
                        "action attempt failed"
                    );
                }
            }
        }

        report.pending = self.store.pending_action_count().await?;
        Ok(report)
    }

    async fn handle_action(&self, action: &OfflineAction) -> Result<ActionOutcome, AppError> {
        match action.kind {
            ActionKind::CreateSession => self.handle_create_session(action).await,
            ActionKind::JoinSession => self.handle_join_session(action).await,
            ActionKind::AddScore => self.handle_add_score(action).await,
            ActionKind::UpdateSession => self.handle_update_session(action).await,
        }
    }

    async fn handle_create_session(
        &self,
        action: &OfflineAction,
    ) -> Result<ActionOutcome, AppError> {
        let Some(session) = self.store.get_session(&action.session_local_id).await? else {
            return Ok(ActionOutcome::Failed(
                "session no longer exists locally".to_string(),
            ));
        };

        let (server_id, roster_from_create) = match &session.server_id {
            // Created on an earlier attempt; never POST the session twice.
            Some(id) => (id.clone(), None),
            None => {
                let payload: CreateSessionPayload = match action.parse_payload() {
                    Ok(payload) => payload,
                    Err(err) => return Ok(ActionOutcome::Failed(err.to_string())),
                };
                let request = CreateSessionRequest {
                    name: payload.name,
                    game: payload.game,
                    player_names: payload.player_names,
                    has_teams: payload.has_teams,
                    min_players: payload.min_players,
                    max_players: payload.max_players,
                };
                match self.call_remote(self.api.create_session(&request)).await {
                    Ok(remote) => {
                        self.store
                            .confirm_session(&session.local_id, &remote.id, Utc::now())
                            .await?;
                        let roster = (!remote.players.is_empty()).then_some(remote.players);
                        (remote.id, roster)
                    }
                    Err(message) => return Ok(ActionOutcome::Failed(message)),
                }
            }
        };

        self.finish_reconciliation(action, &session.local_id, &server_id, roster_from_create)
            .await
    }

    /// Positional player mapping. Pairs local player `i` with server player
    /// `i`; local order comes from the `position` column, server order from
    /// the roster as submitted at creation time. A count mismatch fails the
    /// whole action; a partial mapping would corrupt score attribution.
    async fn finish_reconciliation(
        &self,
        action: &OfflineAction,
        session_local_id: &LocalId,
        server_id: &ServerId,
        roster_from_create: Option<Vec<RemotePlayer>>,
    ) -> Result<ActionOutcome, AppError> {
        let local_players = self.store.list_players(session_local_id).await?;
        if local_players.iter().all(|p| p.is_resolved()) {
            self.store
                .mark_actions_synced(std::slice::from_ref(&action.local_id), Utc::now())
                .await?;
            return Ok(ActionOutcome::Synced(1));
        }

        let server_players = match roster_from_create {
            Some(players) => players,
            None => match self.call_remote(self.api.list_players(server_id)).await {
                Ok(players) => players,
                // The session row is already confirmed; the action stays
                // retryable so reconciliation is re-attempted without
                // re-creating the session.
                Err(message) => return Ok(ActionOutcome::Failed(message)),
            },
        };

        if server_players.len() != local_players.len() {
            return Ok(ActionOutcome::Failed(format!(
                "player count mismatch: {} local, {} server",
                local_players.len(),
                server_players.len()
            )));
        }

        let pairs: Vec<(LocalId, ServerId)> = local_players
            .iter()
            .zip(server_players.iter())
            .map(|(local, remote)| (local.local_id.clone(), remote.id.clone()))
            .collect();
        self.store.confirm_players(&pairs).await?;
        self.store
            .mark_actions_synced(std::slice::from_ref(&action.local_id), Utc::now())
            .await?;
        tracing::info!(
            target: "offline::sync",
            session = %session_local_id,
            players = pairs.len(),
            "session reconciled"
        );
        Ok(ActionOutcome::Synced(1))
    }

    async fn handle_join_session(&self, action: &OfflineAction) -> Result<ActionOutcome, AppError> {
        let payload: JoinSessionPayload = match action.parse_payload() {
            Ok(payload) => payload,
            Err(err) => return Ok(ActionOutcome::Failed(err.to_string())),
        };
        let Some(session) = self.store.get_session(&action.session_local_id).await? else {
            return Ok(ActionOutcome::Failed(
                "session no longer exists locally".to_string(),
            ));
        };
        let Some(server_id) = session.server_id else {
            return Ok(ActionOutcome::Deferred);
        };

        let request = JoinSessionRequest {
            player_name: payload.player_name,
            team: payload.team,
        };
        match self
            .call_remote(self.api.join_session(&server_id, &request))
            .await
        {
            Ok(remote_player) => {
                self.store
                    .confirm_players(&[(payload.player_local_id, remote_player.id)])
                    .await?;
                self.store
                    .mark_actions_synced(std::slice::from_ref(&action.local_id), Utc::now())
                    .await?;
                Ok(ActionOutcome::Synced(1))
            }
            Err(message) => Ok(ActionOutcome::Failed(message)),
        }
    }

    async fn handle_add_score(&self, action: &OfflineAction) -> Result<ActionOutcome, AppError> {
        let payload: ScorePayload = match action.parse_payload() {
            Ok(payload) => payload,
            Err(err) => return Ok(ActionOutcome::Failed(err.to_string())),
        };
        match payload.round_number {
            Some(round) => self.handle_round_batch(action, round).await,
            None => self.handle_category_score(action, &payload).await,
        }
    }

    /// Two-phase round submission. Collect: gather every still-pending cell
    /// of this round plus the roster. Commit: only once the session and all
    /// scoring players carry server ids, ship the round as one batch and
    /// confirm every contributing action together. The server treats a
    /// round as atomic; a partial subset must never be confirmed alone.
    async fn handle_round_batch(
        &self,
        action: &OfflineAction,
        round: u32,
    ) -> Result<ActionOutcome, AppError> {
        let session_local_id = &action.session_local_id;
        let Some(session) = self.store.get_session(session_local_id).await? else {
            return Ok(ActionOutcome::Failed(
                "session no longer exists locally".to_string(),
            ));
        };
        let Some(server_session_id) = session.server_id else {
            return Ok(ActionOutcome::Deferred);
        };

        let siblings = self
            .store
            .list_pending_round_actions(session_local_id, round)
            .await?;
        let scores = self.store.list_round_scores(session_local_id, round).await?;
        let pending_scores: Vec<_> = scores
            .into_iter()
            .filter(|s| s.sync_status != SyncStatus::Synced)
            .collect();
        if pending_scores.is_empty() {
            // The whole round already went out (e.g. confirmed by a sibling
            // in an earlier cycle); nothing left but the bookkeeping.
            self.store
                .mark_actions_synced(std::slice::from_ref(&action.local_id), Utc::now())
                .await?;
            return Ok(ActionOutcome::Synced(1));
        }

        let players = self.store.list_players(session_local_id).await?;
        let by_local_id: HashMap<&str, Option<&ServerId>> = players
            .iter()
            .map(|p| (p.local_id.as_str(), p.server_id.as_ref()))
            .collect();

        let mut entries = Vec::with_capacity(pending_scores.len());
        for score in &pending_scores {
            match by_local_id
                .get(score.player_local_id.as_str())
                .copied()
                .flatten()
            {
                Some(player_server_id) => entries.push(RoundScoreEntry {
                    player_id: player_server_id.clone(),
                    points: score.points,
                    detail: score.detail.clone(),
                }),
                None => return Ok(ActionOutcome::Deferred),
            }
        }

        let submission = RoundSubmission {
            round_number: round,
            scores: entries,
        };
        match self
            .call_remote(self.api.submit_round(&server_session_id, &submission))
            .await
        {
            Ok(()) => {
                let action_ids: Vec<LocalId> =
                    siblings.iter().map(|a| a.local_id.clone()).collect();
                let score_ids: Vec<LocalId> = pending_scores
                    .iter()
                    .map(|s| s.local_id.clone())
                    .collect();
                self.store
                    .mark_actions_synced(&action_ids, Utc::now())
                    .await?;
                self.store.mark_scores_synced(&score_ids).await?;
                tracing::info!(
                    target: "offline::sync",
                    session = %session_local_id,
                    round,
                    cells = score_ids.len(),
                    "round submitted"
                );
                Ok(ActionOutcome::Synced(action_ids.len() as u32))
            }
            Err(message) => Ok(ActionOutcome::Failed(message)),
        }
    }

    async fn handle_category_score(
        &self,
        action: &OfflineAction,
        payload: &ScorePayload,
    ) -> Result<ActionOutcome, AppError> {
        let Some(session) = self.store.get_session(&action.session_local_id).await? else {
            return Ok(ActionOutcome::Failed(
                "session no longer exists locally".to_string(),
            ));
        };
        let Some(server_session_id) = session.server_id else {
            return Ok(ActionOutcome::Deferred);
        };

        let players = self.store.list_players(&action.session_local_id).await?;
        let Some(player_server_id) = players
            .iter()
            .find(|p| p.local_id == payload.player_local_id)
            .and_then(|p| p.server_id.clone())
        else {
            return Ok(ActionOutcome::Deferred);
        };

        let scores = self.store.list_scores(&action.session_local_id).await?;
        let Some(score) = scores.iter().find(|s| s.local_id == payload.score_local_id) else {
            return Ok(ActionOutcome::Failed(
                "score no longer exists locally".to_string(),
            ));
        };
        if score.sync_status == SyncStatus::Synced {
            self.store
                .mark_actions_synced(std::slice::from_ref(&action.local_id), Utc::now())
                .await?;
            return Ok(ActionOutcome::Synced(1));
        }
        let Some(category) = score.category.clone() else {
            return Ok(ActionOutcome::Failed("score has no category".to_string()));
        };

        let submission = CategoryScoreSubmission {
            player_id: player_server_id,
            category,
            points: score.points,
            detail: score.detail.clone(),
        };
        match self
            .call_remote(
                self.api
                    .submit_category_score(&server_session_id, &submission),
            )
            .await
        {
            Ok(()) => {
                self.store
                    .mark_scores_synced(std::slice::from_ref(&score.local_id))
                    .await?;
                self.store
                    .mark_actions_synced(std::slice::from_ref(&action.local_id), Utc::now())
                    .await?;
                Ok(ActionOutcome::Synced(1))
            }
            Err(message) => Ok(ActionOutcome::Failed(message)),
        }
    }

    async fn handle_update_session(
        &self,
        action: &OfflineAction,
    ) -> Result<ActionOutcome, AppError> {
        let payload: UpdateSessionPayload = match action.parse_payload() {
            Ok(payload) => payload,
            Err(err) => return Ok(ActionOutcome::Failed(err.to_string())),
        };
        let Some(session) = self.store.get_session(&action.session_local_id).await? else {
            return Ok(ActionOutcome::Failed(
                "session no longer exists locally".to_string(),
            ));
        };
        let Some(server_id) = session.server_id else {
            return Ok(ActionOutcome::Deferred);
        };

        match self
            .call_remote(self.api.update_session(&server_id, &payload.fields))
            .await
        {
            Ok(()) => {
                self.store
                    .mark_actions_synced(std::slice::from_ref(&action.local_id), Utc::now())
                    .await?;
                Ok(ActionOutcome::Synced(1))
            }
            Err(message) => Ok(ActionOutcome::Failed(message)),
        }
    }

    /// Every remote call runs under the configured timeout so one hung
    /// request cannot stall the cycle indefinitely.
    async fn call_remote<T>(
        &self,
        fut: impl Future<Output = Result<T, AppError>>,
    ) -> Result<T, String> {
        let timeout = Duration::from_secs(self.config.request_timeout_secs);
        match tokio::time::timeout(timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(err.to_string()),
            Err(_) => Err(format!(
                "request timed out after {}s",
                self.config.request_timeout_secs
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::remote_api::RemoteSession;
    use crate::application::ports::AlwaysAuthorized;
    use crate::application::services::session_service::{RoundEntry, SessionService};
    use crate::domain::entities::NewOfflineSession;
    use crate::infrastructure::offline::SqliteLocalStore;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use tokio::time::{sleep, timeout};

    #[derive(Default)]
    struct MockApi {
        create_calls: AtomicU32,
        round_calls: AtomicU32,
        fail_everything: AtomicBool,
    }

    impl MockApi {
        fn failing() -> Self {
            let api = Self::default();
            api.fail_everything.store(true, Ordering::SeqCst);
            api
        }

        fn check_online(&self) -> Result<(), AppError> {
            if self.fail_everything.load(Ordering::SeqCst) {
                Err(AppError::Network("connection refused".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait::async_trait]
    impl RemoteApi for MockApi {
        async fn create_session(
            &self,
            request: &CreateSessionRequest,
        ) -> Result<RemoteSession, AppError> {
            self.check_online()?;
            let n = self.create_calls.fetch_add(1, Ordering::SeqCst);
            Ok(RemoteSession {
                id: ServerId::parse(&format!("srv-sess-{n}")).unwrap(),
                name: request.name.clone(),
                game: request.game.clone(),
                status: crate::domain::value_objects::SessionStatus::Waiting,
                players: request
                    .player_names
                    .iter()
                    .enumerate()
                    .map(|(i, name)| RemotePlayer {
                        id: ServerId::parse(&format!("srv-p{i}")).unwrap(),
                        name: name.clone(),
                    })
                    .collect(),
                last_activity: Utc::now(),
            })
        }

        async fn list_sessions(&self) -> Result<Vec<RemoteSession>, AppError> {
            self.check_online()?;
            Ok(Vec::new())
        }

        async fn session_status(
            &self,
            _session_id: &ServerId,
        ) -> Result<crate::domain::value_objects::SessionStatus, AppError> {
            self.check_online()?;
            Ok(crate::domain::value_objects::SessionStatus::Active)
        }

        async fn list_players(
            &self,
            _session_id: &ServerId,
        ) -> Result<Vec<RemotePlayer>, AppError> {
            self.check_online()?;
            Ok(Vec::new())
        }

        async fn join_session(
            &self,
            _session_id: &ServerId,
            request: &JoinSessionRequest,
        ) -> Result<RemotePlayer, AppError> {
            self.check_online()?;
            Ok(RemotePlayer {
                id: ServerId::parse("srv-joined").unwrap(),
                name: request.player_name.clone(),
            })
        }

        async fn submit_round(
            &self,
            _session_id: &ServerId,
            _submission: &RoundSubmission,
        ) -> Result<(), AppError> {
            self.check_online()?;
            self.round_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn submit_category_score(
            &self,
            _session_id: &ServerId,
            _submission: &CategoryScoreSubmission,
        ) -> Result<(), AppError> {
            self.check_online()?;
            Ok(())
        }

        async fn update_session(
            &self,
            _session_id: &ServerId,
            _fields: &serde_json::Value,
        ) -> Result<(), AppError> {
            self.check_online()?;
            Ok(())
        }
    }

    struct TestMonitor {
        tx: watch::Sender<bool>,
    }

    impl NetworkMonitor for TestMonitor {
        fn is_online(&self) -> bool {
            *self.tx.borrow()
        }

        fn subscribe(&self) -> watch::Receiver<bool> {
            self.tx.subscribe()
        }
    }

    async fn setup(api: Arc<MockApi>) -> (Arc<SyncService>, SessionService, Arc<dyn LocalStore>) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();

        let store: Arc<dyn LocalStore> = Arc::new(SqliteLocalStore::new(pool));
        let config = SyncConfig::default();
        let sessions = SessionService::new(Arc::clone(&store), &config);
        let engine = SyncService::new(
            Arc::clone(&store),
            api as Arc<dyn RemoteApi>,
            Arc::new(AlwaysAuthorized),
            config,
        );
        (engine, sessions, store)
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
    async fn start_is_idempotent_and_stop_halts_the_loop() {
        let (engine, _, _) = setup(Arc::new(MockApi::default())).await;

        engine.start().await;
        engine.start().await;
        assert!(engine.is_running().await);

        engine.stop().await;
        assert!(!engine.is_running().await);

        engine.start().await;
        assert!(engine.is_running().await);
        engine.stop().await;
    }

    #[tokio::test]
    async fn scores_defer_while_their_session_is_unconfirmed() {
        let api = Arc::new(MockApi::failing());
        let (engine, sessions, store) = setup(Arc::clone(&api)).await;

        let session = sessions.create_offline_session(tarot_draft()).await.unwrap();
        let players = store.list_players(&session.local_id).await.unwrap();
        sessions
            .record_round(
                &session.local_id,
                1,
                players
                    .iter()
                    .map(|p| RoundEntry {
                        player_local_id: p.local_id.clone(),
                        points: 10,
                        detail: None,
                    })
                    .collect(),
            )
            .await
            .unwrap();

        let report = engine.force_sync().await.unwrap();
        // The create fails against the dead network; every round cell
        // defers because the session has no server identifier yet.
        assert_eq!(report.failed, 1);
        assert_eq!(report.deferred, 4);
        assert_eq!(report.synced, 0);

        // Deferrals must not burn retries.
        let round_actions = store
            .list_pending_round_actions(&session.local_id, 1)
            .await
            .unwrap();
        assert!(round_actions.iter().all(|a| a.retry_count == 0));
        assert_eq!(api.round_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn monitor_bridge_follows_connectivity() {
        let (engine, _, _) = setup(Arc::new(MockApi::default())).await;
        let (tx, _rx) = watch::channel(false);
        let monitor = Arc::new(TestMonitor { tx });

        let bridge = engine.spawn_monitor_bridge(monitor.clone() as Arc<dyn NetworkMonitor>);
        assert!(!engine.is_running().await);

        monitor.tx.send(true).unwrap();
        timeout(Duration::from_secs(5), async {
            while !engine.is_running().await {
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("engine did not start on online signal");

        monitor.tx.send(false).unwrap();
        timeout(Duration::from_secs(5), async {
            while engine.is_running().await {
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("engine did not stop on offline signal");

        bridge.abort();
    }

    #[tokio::test]
    async fn cycle_reports_reach_subscribers() {
        let (engine, sessions, _) = setup(Arc::new(MockApi::default())).await;
        let mut reports = engine.subscribe();

        sessions.create_offline_session(tarot_draft()).await.unwrap();
        engine.force_sync().await.unwrap();

        let report = reports.recv().await.unwrap();
        assert_eq!(report.synced, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(report.pending, 0);
    }

    #[tokio::test]
    async fn successful_create_posts_exactly_once() {
        let api = Arc::new(MockApi::default());
        let (engine, sessions, store) = setup(Arc::clone(&api)).await;

        let session = sessions.create_offline_session(tarot_draft()).await.unwrap();
        engine.force_sync().await.unwrap();
        engine.force_sync().await.unwrap();

        assert_eq!(api.create_calls.load(Ordering::SeqCst), 1);
        let players = store.list_players(&session.local_id).await.unwrap();
        assert!(players.iter().all(|p| p.server_id.is_some()));
    }
}
