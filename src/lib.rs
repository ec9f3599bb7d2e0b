//! Offline-first sync core for the ScoreTally scoresheet app.
//!
//! Gameplay writes land in the local store together with an outbox action in
//! one transaction; the UI reads the optimistic local state immediately,
//! while the [`application::services::SyncService`] drains the outbox
//! against the authoritative server whenever the device is online and
//! attaches server identifiers back onto the local records.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;

pub use application::ports::{
    AlwaysAuthorized, LocalStore, NetworkMonitor, RemoteApi, SyncAuthorization,
};
pub use application::services::{
    ContinuityService, RoundEntry, SessionListService, SessionOverview, SessionService,
    SyncReport, SyncService,
};
pub use domain::entities::{
    NewOfflineSession, OfflineAction, OfflinePlayer, OfflineScore, OfflineSession, RecentSession,
    SessionPatch,
};
pub use domain::value_objects::{ActionKind, LocalId, ServerId, SessionStatus, SyncStatus};
pub use infrastructure::api::HttpRemoteApi;
pub use infrastructure::database::ConnectionPool;
pub use infrastructure::offline::SqliteLocalStore;
pub use shared::config::AppConfig;
pub use shared::error::AppError;

use tracing_subscriber::EnvFilter;

/// Install the tracing subscriber. Safe to call once at startup.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
