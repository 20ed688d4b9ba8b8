//! Backend seam used by the orchestrator and step handlers.

use async_trait::async_trait;
use vmix_models::TaskId;

use crate::error::QueueResult;
use crate::job::{CleanupJob, QueueJob};

/// Fan-in barrier registration: `total` chains gate `cleanup`.
#[derive(Debug, Clone)]
pub struct FanIn {
    pub task_id: TaskId,
    pub total: usize,
    pub cleanup: CleanupJob,
}

/// Result of reporting a terminal chain to the barrier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FanInProgress {
    /// Chains still outstanding
    Pending { remaining: usize },
    /// Every chain is terminal; dispatch `cleanup`, then close the barrier
    Released { cleanup: CleanupJob },
    /// The chain had already been reported
    AlreadyCounted,
    /// No barrier is open for the task (released earlier or never opened)
    Closed,
}

/// Where jobs and barriers live.
#[async_trait]
pub trait JobBackend: Send + Sync {
    /// Route a job to its class stream. Returns the backend message id.
    async fn enqueue(&self, job: QueueJob) -> QueueResult<String>;

    /// Register a barrier before any chain of the task is enqueued.
    async fn open_fan_in(&self, fan_in: &FanIn) -> QueueResult<()>;

    /// Record chain `index` of `task_id` as terminal.
    ///
    /// The report completing the barrier returns [`FanInProgress::Released`]
    /// and so does every later report, until [`JobBackend::close_fan_in`]
    /// removes the barrier. A failed cleanup dispatch can therefore be
    /// repeated by whichever step reports next.
    async fn chain_terminal(&self, task_id: &TaskId, index: usize) -> QueueResult<FanInProgress>;

    /// Remove a barrier, released or not.
    async fn close_fan_in(&self, task_id: &TaskId) -> QueueResult<()>;
}
