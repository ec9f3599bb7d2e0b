use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
    pub cache: CacheConfig,
    pub continuity: ContinuityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub auto_sync: bool,
    /// Delay before the next drain cycle when the queue was empty or drained cleanly.
    pub idle_delay_secs: u64,
    /// Delay when at least one action failed during the cycle.
    pub retry_delay_secs: u64,
    /// Delay when the cycle itself aborted unexpectedly.
    pub error_delay_secs: u64,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub session_list_ttl_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinuityConfig {
    pub retention_days: i64,
    pub reconnect_window_hours: i64,
    pub max_entries: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: format!("sqlite:{}", default_db_path().display()),
                max_connections: 5,
                connection_timeout: 30,
            },
            sync: SyncConfig::default(),
            cache: CacheConfig {
                session_list_ttl_secs: 300,
            },
            continuity: ContinuityConfig {
                retention_days: 7,
                reconnect_window_hours: 24,
                max_entries: 20,
            },
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_sync: true,
            idle_delay_secs: 30,
            retry_delay_secs: 10,
            error_delay_secs: 60,
            request_timeout_secs: 15,
            max_retries: 3,
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("data"))
        .join("scoretally")
        .join("scoretally.db")
}
