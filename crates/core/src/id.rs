//! Unique identifiers for delegated tasks.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Prefix carried by every generated task id.
pub const TASK_ID_PREFIX: &str = "task_";

/// Unique identifier for a Task.
///
/// Generated ids are `task_<ULID>`, so they sort by creation time. Callers may
/// also bring their own id; uniqueness is then enforced by the record store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Generate a new TaskId
    pub fn new() -> Self {
        Self(format!("{}{}", TASK_ID_PREFIX, Ulid::new()))
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id can be used as a key: non-empty and free of whitespace.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty() && !self.0.chars().any(char::is_whitespace)
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_ids_are_prefixed_and_unique() {
        let ids: HashSet<TaskId> = (0..1000).map(|_| TaskId::new()).collect();
        assert_eq!(ids.len(), 1000);
        assert!(ids.iter().all(|id| id.as_str().starts_with(TASK_ID_PREFIX)));
        assert!(ids.iter().all(TaskId::is_valid));
    }

    #[test]
    fn test_caller_ids() {
        assert!(TaskId::from("research-1").is_valid());
        assert!(!TaskId::from("").is_valid());
        assert!(!TaskId::from("has space").is_valid());
    }

    #[test]
    fn test_serde_is_transparent() {
        let id = TaskId::from("abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
    }
}
