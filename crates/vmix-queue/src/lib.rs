//! Redis Streams job queue and job graph.
//!
//! This crate provides:
//! - Job types routed to `heavy`, `light` and `default` stream classes
//! - The [`JobBackend`] seam with Redis and in-memory implementations
//! - Fan-out/fan-in graphs with an exactly-once cleanup barrier
//! - Worker consumption with retry/DLQ

pub mod backend;
pub mod error;
pub mod graph;
pub mod job;
pub mod memory;
pub mod queue;

pub use backend::{FanIn, FanInProgress, JobBackend};
pub use error::{QueueError, QueueResult};
pub use graph::{finish_chain, JobGraph, JobGraphBuilder};
pub use job::{
    CleanupJob, CleanupTrigger, OrchestrateJob, QueueClass, QueueJob, RenderJob, RenderParams,
    UploadJob,
};
pub use memory::MemoryBackend;
pub use queue::{Delivery, JobQueue, QueueConfig};
