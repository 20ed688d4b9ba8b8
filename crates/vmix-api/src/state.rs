//! Application state.

use std::sync::Arc;

use vmix_queue::{JobBackend, JobQueue};

use crate::config::ApiConfig;
use crate::error::ApiResult;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub backend: Arc<dyn JobBackend>,
    /// Set when the backend is Redis; used by the readiness probe
    pub queue: Option<Arc<JobQueue>>,
}

impl AppState {
    /// Connect to the Redis queue described by the environment.
    pub async fn new(config: ApiConfig) -> ApiResult<Self> {
        let queue = Arc::new(JobQueue::from_env()?);
        queue.init().await?;

        Ok(Self {
            config,
            backend: queue.clone(),
            queue: Some(queue),
        })
    }

    /// State over an arbitrary backend, without readiness checks.
    pub fn with_backend(config: ApiConfig, backend: Arc<dyn JobBackend>) -> Self {
        Self {
            config,
            backend,
            queue: None,
        }
    }
}
