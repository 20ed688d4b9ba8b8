//! Structured step logging.

use tracing::{error, info, warn, Span};
use vmix_queue::QueueJob;

/// Logs a step's lifecycle with its task id, step kind and chain index.
#[derive(Debug, Clone)]
pub struct JobLogger {
    task_id: String,
    step: &'static str,
    index: Option<usize>,
}

impl JobLogger {
    pub fn new(job: &QueueJob) -> Self {
        Self {
            task_id: job.task_id().to_string(),
            step: job.kind(),
            index: job.chain_index(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(task_id = %self.task_id, step = self.step, index = ?self.index, "Step started: {}", message);
    }

    pub fn log_progress(&self, message: &str) {
        info!(task_id = %self.task_id, step = self.step, index = ?self.index, "Step progress: {}", message);
    }

    pub fn log_warning(&self, message: &str) {
        warn!(task_id = %self.task_id, step = self.step, index = ?self.index, "Step warning: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(task_id = %self.task_id, step = self.step, index = ?self.index, "Step error: {}", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(task_id = %self.task_id, step = self.step, index = ?self.index, "Step completed: {}", message);
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn step(&self) -> &'static str {
        self.step
    }

    /// Span carrying the same fields, for instrumenting a step's future.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("step", task_id = %self.task_id, step = self.step, index = ?self.index)
    }
}
