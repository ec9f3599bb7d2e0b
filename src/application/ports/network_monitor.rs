use tokio::sync::watch;

/// Connectivity signal. The sync engine is stopped while offline and
/// restarted when the device comes back online.
pub trait NetworkMonitor: Send + Sync {
    fn is_online(&self) -> bool;
    /// Current value plus change notifications.
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// "May this device talk to the authenticated API right now." Consulted
/// before every drain cycle; guests without an account simply keep their
/// queue local.
pub trait SyncAuthorization: Send + Sync {
    fn can_sync(&self) -> bool;
}

/// Capability check that always passes, for locally-authorized devices and
/// tests.
pub struct AlwaysAuthorized;

impl SyncAuthorization for AlwaysAuthorized {
    fn can_sync(&self) -> bool {
        true
    }
}
