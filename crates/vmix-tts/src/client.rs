//! ElevenLabs-compatible HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use tracing::{debug, warn};

use crate::error::{TtsError, TtsResult};
use crate::types::{SynthesisRequest, Voice, VoicesResponse};

/// Operations the voiceover pipeline needs from a speech provider.
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    /// All voices available to the account, in provider order.
    async fn list_voices(&self) -> TtsResult<Vec<Voice>>;

    /// Synthesize `text` with `voice_id`, returning encoded audio.
    async fn synthesize(&self, text: &str, voice_id: &str) -> TtsResult<Vec<u8>>;
}

/// Configuration for the TTS client.
#[derive(Debug, Clone)]
pub struct TtsConfig {
    /// Base URL of the provider API
    pub base_url: String,
    /// API key sent as `xi-api-key`
    pub api_key: String,
    /// Synthesis model
    pub model_id: String,
    /// Request timeout
    pub timeout: Duration,
    /// Max retries
    pub max_retries: u32,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.elevenlabs.io".to_string(),
            api_key: String::new(),
            model_id: "eleven_multilingual_v1".to_string(),
            timeout: Duration::from_secs(120),
            max_retries: 2,
        }
    }
}

impl TtsConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("ELEVENLABS_BASE_URL")
                .unwrap_or_else(|_| "https://api.elevenlabs.io".to_string()),
            api_key: std::env::var("ELEVENLABS_API_KEY").unwrap_or_default(),
            model_id: std::env::var("ELEVENLABS_MODEL_ID")
                .unwrap_or_else(|_| "eleven_multilingual_v1".to_string()),
            timeout: Duration::from_secs(
                std::env::var("ELEVENLABS_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
            max_retries: std::env::var("ELEVENLABS_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
        }
    }
}

/// Client for the ElevenLabs HTTP API.
pub struct ElevenLabsClient {
    http: Client,
    config: TtsConfig,
}

impl ElevenLabsClient {
    /// Create a new client.
    pub fn new(config: TtsConfig) -> TtsResult<Self> {
        if config.api_key.is_empty() {
            return Err(TtsError::Config("ELEVENLABS_API_KEY is not set".to_string()));
        }

        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(TtsError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> TtsResult<Self> {
        Self::new(TtsConfig::from_env())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Execute with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> TtsResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = TtsResult<T>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                    warn!(
                        "TTS request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| TtsError::request_failed("Unknown error")))
    }
}

/// Map non-success statuses; 5xx and 429 are treated as transient.
async fn check_status(response: Response) -> TtsResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let msg = format!("TTS service returned {}: {}", status, body);
    if status.is_server_error() || status.as_u16() == 429 {
        Err(TtsError::ServiceUnavailable(msg))
    } else {
        Err(TtsError::RequestFailed(msg))
    }
}

#[async_trait]
impl SpeechProvider for ElevenLabsClient {
    async fn list_voices(&self) -> TtsResult<Vec<Voice>> {
        let url = self.url("/v1/voices");
        debug!("Listing voices from {}", url);

        let response = self
            .with_retry(|| async {
                let response = self
                    .http
                    .get(&url)
                    .header("xi-api-key", &self.config.api_key)
                    .send()
                    .await?;
                check_status(response).await
            })
            .await?;

        let voices: VoicesResponse = response.json().await?;
        Ok(voices.voices)
    }

    async fn synthesize(&self, text: &str, voice_id: &str) -> TtsResult<Vec<u8>> {
        let url = self.url(&format!("/v1/text-to-speech/{}", voice_id));
        let body = SynthesisRequest {
            text,
            model_id: &self.config.model_id,
        };

        let response = self
            .with_retry(|| async {
                let response = self
                    .http
                    .post(&url)
                    .header("xi-api-key", &self.config.api_key)
                    .header("accept", "audio/mpeg")
                    .json(&body)
                    .send()
                    .await?;
                check_status(response).await
            })
            .await?;

        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base_url: String) -> ElevenLabsClient {
        ElevenLabsClient::new(TtsConfig {
            base_url,
            api_key: "test-key".to_string(),
            max_retries: 1,
            ..TtsConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = TtsConfig::default();
        assert_eq!(config.model_id, "eleven_multilingual_v1");
        assert_eq!(config.timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_missing_key_rejected() {
        assert!(matches!(
            ElevenLabsClient::new(TtsConfig::default()),
            Err(TtsError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_list_voices() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/voices"))
            .and(header("xi-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "voices": [
                    {"name": "Rachel - calm & quiet", "voice_id": "v-rachel"},
                    {"name": "Adam", "voice_id": "v-adam"}
                ]
            })))
            .mount(&server)
            .await;

        let voices = client(server.uri()).list_voices().await.unwrap();
        assert_eq!(voices.len(), 2);
        assert_eq!(voices[0].voice_id, "v-rachel");
    }

    #[tokio::test]
    async fn test_synthesize_sends_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/text-to-speech/v-adam"))
            .and(body_json(serde_json::json!({
                "text": "Hello",
                "model_id": "eleven_multilingual_v1"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3audio".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let audio = client(server.uri()).synthesize("Hello", "v-adam").await.unwrap();
        assert_eq!(audio, b"ID3audio");
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(server.uri()).synthesize("Hi", "v").await.unwrap_err();
        assert!(matches!(err, TtsError::RequestFailed(_)));
    }
}
