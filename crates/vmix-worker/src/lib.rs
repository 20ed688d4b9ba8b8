//! Media request worker.
//!
//! This crate provides:
//! - Orchestration: asset fetching, voiceovers, combination planning and graph submission
//! - Render, upload and cleanup steps
//! - Job executor with retry, DLQ and crash recovery
//! - Graceful shutdown

pub mod combinations;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod steps;
pub mod workspace;

pub use combinations::{pick_tracks, Combination, CombinationIter, CombinationPlanner};
pub use config::WorkerConfig;
pub use context::WorkerContext;
pub use error::{WorkerError, WorkerResult};
pub use executor::{process_job, JobExecutor};
pub use logging::JobLogger;
pub use orchestrator::orchestrate;
pub use steps::{abandon_step, run_cleanup, run_render, run_upload};
pub use workspace::WorkTask;
