//! Job types for the queue.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vmix_models::{MediaRequest, TaskId};

/// Queue class a job runs on. Each class is its own stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueClass {
    /// Encoding work
    Heavy,
    /// Uploads and cleanup
    Light,
    /// Orchestration
    Default,
}

impl QueueClass {
    pub const ALL: [QueueClass; 3] = [QueueClass::Heavy, QueueClass::Light, QueueClass::Default];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueClass::Heavy => "heavy",
            QueueClass::Light => "light",
            QueueClass::Default => "default",
        }
    }
}

impl fmt::Display for QueueClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "heavy" => Ok(QueueClass::Heavy),
            "light" => Ok(QueueClass::Light),
            "default" => Ok(QueueClass::Default),
            other => Err(format!("unknown queue class '{}'", other)),
        }
    }
}

/// Turn a request into a job graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrateJob {
    pub task_id: TaskId,
    pub request: MediaRequest,
    pub submitted_at: DateTime<Utc>,
}

impl OrchestrateJob {
    pub fn new(request: MediaRequest) -> Self {
        Self {
            task_id: TaskId::new(),
            request,
            submitted_at: Utc::now(),
        }
    }

    pub fn idempotency_key(&self) -> String {
        format!("orchestrate:{}", self.task_id)
    }
}

/// Inputs of one combination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderParams {
    /// One clip per block, in block order
    pub videos: Vec<PathBuf>,
    pub audio: PathBuf,
    pub voiceover: PathBuf,
    pub index: usize,
    pub total: usize,
}

/// First step of a chain: encode one variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderJob {
    pub task_id: TaskId,
    pub task_name: String,
    /// Task working directory (`<root>/task_<id>`)
    pub work_dir: PathBuf,
    pub params: RenderParams,
}

impl RenderJob {
    pub fn idempotency_key(&self) -> String {
        format!("render:{}:{}", self.task_id, self.params.index)
    }

    /// The chain's follow-up step once `local_path` is rendered.
    pub fn upload(&self, local_path: PathBuf) -> UploadJob {
        UploadJob {
            task_id: self.task_id.clone(),
            task_name: self.task_name.clone(),
            index: self.params.index,
            local_path,
        }
    }
}

/// Second step of a chain: ship the rendered file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadJob {
    pub task_id: TaskId,
    pub task_name: String,
    pub index: usize,
    pub local_path: PathBuf,
}

impl UploadJob {
    pub fn idempotency_key(&self) -> String {
        format!("upload:{}:{}", self.task_id, self.index)
    }
}

/// Why cleanup was dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupTrigger {
    /// Every chain reached a terminal state
    FanIn,
    /// The orchestrator failed before the graph was submitted
    SetupFailure,
}

/// Remove a task's working directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupJob {
    pub task_id: TaskId,
    pub work_dir: PathBuf,
    pub started_at: DateTime<Utc>,
    pub trigger: CleanupTrigger,
}

impl CleanupJob {
    pub fn idempotency_key(&self) -> String {
        format!("cleanup:{}", self.task_id)
    }
}

/// Generic job wrapper for queue storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueJob {
    /// Fetch assets, plan combinations and submit the graph
    Orchestrate(OrchestrateJob),
    /// Encode one combination
    Render(RenderJob),
    /// Upload one rendered combination
    Upload(UploadJob),
    /// Purge the task directory
    Cleanup(CleanupJob),
}

impl QueueJob {
    pub fn task_id(&self) -> &TaskId {
        match self {
            QueueJob::Orchestrate(j) => &j.task_id,
            QueueJob::Render(j) => &j.task_id,
            QueueJob::Upload(j) => &j.task_id,
            QueueJob::Cleanup(j) => &j.task_id,
        }
    }

    /// Stream this job is routed to.
    pub fn class(&self) -> QueueClass {
        match self {
            QueueJob::Orchestrate(_) => QueueClass::Default,
            QueueJob::Render(_) => QueueClass::Heavy,
            QueueJob::Upload(_) | QueueJob::Cleanup(_) => QueueClass::Light,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            QueueJob::Orchestrate(_) => "orchestrate",
            QueueJob::Render(_) => "render",
            QueueJob::Upload(_) => "upload",
            QueueJob::Cleanup(_) => "cleanup",
        }
    }

    /// Chain index for render and upload steps.
    pub fn chain_index(&self) -> Option<usize> {
        match self {
            QueueJob::Render(j) => Some(j.params.index),
            QueueJob::Upload(j) => Some(j.index),
            _ => None,
        }
    }

    pub fn idempotency_key(&self) -> String {
        match self {
            QueueJob::Orchestrate(j) => j.idempotency_key(),
            QueueJob::Render(j) => j.idempotency_key(),
            QueueJob::Upload(j) => j.idempotency_key(),
            QueueJob::Cleanup(j) => j.idempotency_key(),
        }
    }
}
