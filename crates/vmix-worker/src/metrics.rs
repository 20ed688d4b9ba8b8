//! Worker metrics.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{WorkerError, WorkerResult};

pub mod names {
    pub const STEPS_COMPLETED_TOTAL: &str = "vmix_steps_completed_total";
    pub const STEPS_FAILED_TOTAL: &str = "vmix_steps_failed_total";
    pub const STEP_DURATION_SECONDS: &str = "vmix_step_duration_seconds";
    pub const CHAINS_TOTAL: &str = "vmix_chains_total";
    pub const TASKS_SUBMITTED_TOTAL: &str = "vmix_tasks_submitted_total";
    pub const COMBINATIONS_PLANNED_TOTAL: &str = "vmix_combinations_planned_total";
    pub const CLEANUPS_TOTAL: &str = "vmix_cleanups_total";
}

/// Serve `/metrics` on `addr`.
pub fn install_exporter(addr: &str) -> WorkerResult<()> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| WorkerError::config_error(format!("invalid metrics address '{}': {}", addr, e)))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("failed to install metrics exporter: {}", e)))
}

pub fn record_step_completed(step: &'static str, duration_secs: f64) {
    counter!(names::STEPS_COMPLETED_TOTAL, "step" => step).increment(1);
    histogram!(names::STEP_DURATION_SECONDS, "step" => step).record(duration_secs);
}

pub fn record_step_failed(step: &'static str, retryable: bool) {
    let retryable = if retryable { "true" } else { "false" };
    counter!(names::STEPS_FAILED_TOTAL, "step" => step, "retryable" => retryable).increment(1);
}

/// Count a chain reaching `outcome` (`done` or `failed`).
pub fn record_chain(outcome: &'static str) {
    counter!(names::CHAINS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_task_submitted(combinations: usize) {
    counter!(names::TASKS_SUBMITTED_TOTAL).increment(1);
    counter!(names::COMBINATIONS_PLANNED_TOTAL).increment(combinations as u64);
}

pub fn record_cleanup(trigger: &'static str) {
    counter!(names::CLEANUPS_TOTAL, "trigger" => trigger).increment(1);
}
