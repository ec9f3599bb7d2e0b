pub mod local_store;
pub mod network_monitor;
pub mod remote_api;

pub use local_store::LocalStore;
pub use network_monitor::{AlwaysAuthorized, NetworkMonitor, SyncAuthorization};
pub use remote_api::{
    CategoryScoreSubmission, CreateSessionRequest, JoinSessionRequest, RemoteApi, RemotePlayer,
    RemoteSession, RoundScoreEntry, RoundSubmission,
};
