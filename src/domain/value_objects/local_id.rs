use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

const LOCAL_PREFIX: &str = "local_";

/// Device-local identifier. Permanent once assigned and never reused as a
/// server identifier; the `local_` prefix keeps the two namespaces apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalId(String);

impl LocalId {
    /// Mint a fresh identifier: unix millis plus a random suffix. Unique
    /// within a device, which is all the offline store needs.
    pub fn generate() -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!(
            "{}{}_{}",
            LOCAL_PREFIX,
            Utc::now().timestamp_millis(),
            &suffix[..8]
        ))
    }

    pub fn new(value: String) -> Result<Self, String> {
        Self::validate(&value)?;
        Ok(Self(value))
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        Self::validate(value)?;
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_local_namespace(value: &str) -> bool {
        value.starts_with(LOCAL_PREFIX)
    }

    fn validate(value: &str) -> Result<(), String> {
        if value.trim().is_empty() {
            return Err("Local ID cannot be empty".to_string());
        }
        Ok(())
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<LocalId> for String {
    fn from(id: LocalId) -> Self {
        id.0
    }
}

impl FromStr for LocalId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_namespaced_and_distinct() {
        let a = LocalId::generate();
        let b = LocalId::generate();
        assert!(LocalId::is_local_namespace(a.as_str()));
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_empty_values() {
        assert!(LocalId::parse("  ").is_err());
    }
}
