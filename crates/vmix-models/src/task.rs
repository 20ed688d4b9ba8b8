//! Task identifiers and lifecycle states.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for one media-processing task.
///
/// The id names the task's working directory (`task_<id>`) and every
/// queue entry that belongs to the task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generate a new random task ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the task's working directory under the temp root.
    pub fn dir_name(&self) -> String {
        format!("task_{}", self.0)
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Phase of a task as seen by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskPhase {
    #[default]
    Started,
    AssetsReady,
    GraphSubmitted,
    CleanedUp,
}

impl TaskPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPhase::Started => "started",
            TaskPhase::AssetsReady => "assets_ready",
            TaskPhase::GraphSubmitted => "graph_submitted",
            TaskPhase::CleanedUp => "cleaned_up",
        }
    }
}

impl fmt::Display for TaskPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a single render → upload chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChainState {
    Rendering,
    Uploading,
    Done,
    Failed,
}

impl ChainState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainState::Rendering => "rendering",
            ChainState::Uploading => "uploading",
            ChainState::Done => "done",
            ChainState::Failed => "failed",
        }
    }

    /// Terminal chains count towards the cleanup barrier.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChainState::Done | ChainState::Failed)
    }
}

impl fmt::Display for ChainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_dir_name() {
        let id = TaskId::from_string("abc-123");
        assert_eq!(id.dir_name(), "task_abc-123");
    }

    #[test]
    fn test_task_id_serializes_transparently() {
        let id = TaskId::from_string("xyz");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"xyz\"");
    }

    #[test]
    fn test_chain_terminal_states() {
        assert!(ChainState::Done.is_terminal());
        assert!(ChainState::Failed.is_terminal());
        assert!(!ChainState::Rendering.is_terminal());
        assert!(!ChainState::Uploading.is_terminal());
    }
}
