use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The server-bound intent an outbox action describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    CreateSession,
    JoinSession,
    AddScore,
    UpdateSession,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::CreateSession => "create_session",
            ActionKind::JoinSession => "join_session",
            ActionKind::AddScore => "add_score",
            ActionKind::UpdateSession => "update_session",
        }
    }

    /// Drain-order hint, lower drains first. Session creation goes ahead of
    /// everything that depends on a server-side session existing.
    pub fn default_priority(&self) -> i64 {
        match self {
            ActionKind::CreateSession => 0,
            ActionKind::JoinSession => 5,
            ActionKind::UpdateSession => 10,
            ActionKind::AddScore => 20,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create_session" => Ok(ActionKind::CreateSession),
            "join_session" => Ok(ActionKind::JoinSession),
            "add_score" => Ok(ActionKind::AddScore),
            "update_session" => Ok(ActionKind::UpdateSession),
            other => Err(format!("Unknown action kind: {other}")),
        }
    }
}
