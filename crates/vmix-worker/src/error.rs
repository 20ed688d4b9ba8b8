//! Worker error types.

use thiserror::Error;
use vmix_queue::QueueError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid request: {0}")]
    Request(#[from] vmix_models::RequestError),

    /// Encoder failure. Permanent for the chain.
    #[error("Render failed: {0}")]
    Render(vmix_media::MediaError),

    #[error("Media error: {0}")]
    Media(#[from] vmix_media::MediaError),

    #[error("TTS error: {0}")]
    Tts(#[from] vmix_tts::TtsError),

    #[error("Storage error: {0}")]
    Storage(#[from] vmix_storage::StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Whether the backend should redeliver the step.
    ///
    /// Transport, storage and queue hiccups retry; encoder and validation
    /// failures do not.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Media(e) => e.is_retryable(),
            WorkerError::Tts(e) => e.is_retryable(),
            WorkerError::Storage(e) => e.is_retryable(),
            WorkerError::Queue(e) => matches!(
                e,
                QueueError::ConnectionFailed(_) | QueueError::EnqueueFailed(_) | QueueError::Redis(_)
            ),
            WorkerError::Io(_) => true,
            WorkerError::JobFailed(_)
            | WorkerError::ConfigError(_)
            | WorkerError::Request(_)
            | WorkerError::Render(_) => false,
        }
    }
}
