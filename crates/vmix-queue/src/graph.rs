//! Fan-out/fan-in job graph: one render → upload chain per combination,
//! all converging on a single cleanup step.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use vmix_models::{ChainState, TaskId};

use crate::backend::{FanIn, FanInProgress, JobBackend};
use crate::error::{QueueError, QueueResult};
use crate::job::{CleanupJob, CleanupTrigger, QueueJob, RenderJob, RenderParams};

/// A fully built graph, ready to submit.
#[derive(Debug, Clone)]
pub struct JobGraph {
    task_id: TaskId,
    chains: Vec<RenderJob>,
    cleanup: CleanupJob,
}

impl JobGraph {
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn total(&self) -> usize {
        self.chains.len()
    }

    /// Open the barrier, then enqueue every chain's first step.
    ///
    /// A graph with no chains dispatches cleanup immediately. If enqueueing
    /// fails part-way the barrier is discarded so it cannot release later.
    pub async fn submit(self, backend: &dyn JobBackend) -> QueueResult<usize> {
        let total = self.chains.len();

        if total == 0 {
            info!(task_id = %self.task_id, "Empty job graph, dispatching cleanup");
            backend.enqueue(QueueJob::Cleanup(self.cleanup)).await?;
            return Ok(0);
        }

        backend
            .open_fan_in(&FanIn {
                task_id: self.task_id.clone(),
                total,
                cleanup: self.cleanup,
            })
            .await?;

        for chain in self.chains {
            if let Err(e) = backend.enqueue(QueueJob::Render(chain)).await {
                warn!(task_id = %self.task_id, "Graph submission failed: {}", e);
                if let Err(close_err) = backend.close_fan_in(&self.task_id).await {
                    warn!(task_id = %self.task_id, "Failed to discard barrier: {}", close_err);
                }
                return Err(e);
            }
        }

        info!(task_id = %self.task_id, total, "Submitted job graph");
        Ok(total)
    }
}

/// Incrementally assembles a [`JobGraph`].
#[derive(Debug)]
pub struct JobGraphBuilder {
    task_id: TaskId,
    task_name: String,
    work_dir: PathBuf,
    started_at: DateTime<Utc>,
    chains: Vec<RenderJob>,
}

impl JobGraphBuilder {
    pub fn new(
        task_id: TaskId,
        task_name: impl Into<String>,
        work_dir: impl Into<PathBuf>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id,
            task_name: task_name.into(),
            work_dir: work_dir.into(),
            started_at,
            chains: Vec::new(),
        }
    }

    pub fn with_capacity(mut self, chains: usize) -> Self {
        self.chains.reserve(chains);
        self
    }

    /// Add the chain for one combination.
    pub fn add_chain(&mut self, params: RenderParams) -> &mut Self {
        self.chains.push(RenderJob {
            task_id: self.task_id.clone(),
            task_name: self.task_name.clone(),
            work_dir: self.work_dir.clone(),
            params,
        });
        self
    }

    pub fn build(self) -> JobGraph {
        let cleanup = CleanupJob {
            task_id: self.task_id.clone(),
            work_dir: self.work_dir,
            started_at: self.started_at,
            trigger: CleanupTrigger::FanIn,
        };

        JobGraph {
            task_id: self.task_id,
            chains: self.chains,
            cleanup,
        }
    }
}

/// Report a chain's terminal state and dispatch cleanup when it was the last.
///
/// The barrier is removed only after cleanup is queued. If that enqueue
/// fails the error is returned and the barrier stays released, so the retry
/// of this step (or any later report) dispatches cleanup again.
pub async fn finish_chain(
    backend: &dyn JobBackend,
    task_id: &TaskId,
    index: usize,
    outcome: ChainState,
) -> QueueResult<FanInProgress> {
    debug_assert!(outcome.is_terminal());

    let progress = backend.chain_terminal(task_id, index).await?;
    match &progress {
        FanInProgress::Released { cleanup } => {
            info!(task_id = %task_id, index, outcome = %outcome, "Last chain finished, dispatching cleanup");
            match backend.enqueue(QueueJob::Cleanup(cleanup.clone())).await {
                Ok(_) | Err(QueueError::Duplicate(_)) => {}
                Err(e) => {
                    warn!(task_id = %task_id, "Cleanup dispatch failed, barrier kept: {}", e);
                    return Err(e);
                }
            }
            if let Err(e) = backend.close_fan_in(task_id).await {
                // expires with the barrier TTL; a later report re-sends a deduplicated cleanup
                warn!(task_id = %task_id, "Failed to remove released barrier: {}", e);
            }
        }
        FanInProgress::Pending { remaining } => {
            debug!(task_id = %task_id, index, outcome = %outcome, remaining, "Chain finished");
        }
        FanInProgress::AlreadyCounted | FanInProgress::Closed => {
            debug!(task_id = %task_id, index, "Chain already reported");
        }
    }

    Ok(progress)
}
