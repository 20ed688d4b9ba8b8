//! Text-to-speech error types.

use thiserror::Error;
use vmix_media::MediaError;

pub type TtsResult<T> = Result<T, TtsError>;

#[derive(Debug, Error)]
pub enum TtsError {
    #[error("Voice not found: {0}")]
    VoiceNotFound(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),
}

impl TtsError {
    pub fn voice_not_found(name: impl Into<String>) -> Self {
        Self::VoiceNotFound(name.into())
    }

    pub fn request_failed(msg: impl Into<String>) -> Self {
        Self::RequestFailed(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, TtsError::ServiceUnavailable(_) | TtsError::Network(_))
    }
}
