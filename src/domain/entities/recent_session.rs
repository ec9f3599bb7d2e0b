use crate::domain::value_objects::{LocalId, ServerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// "This device recently touched that session": the record behind
/// reconnection prompts. An optimization, never correctness-critical.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecentSession {
    pub session_local_id: LocalId,
    pub server_id: Option<ServerId>,
    pub name: String,
    pub game: String,
    pub last_activity: DateTime<Utc>,
}
