//! Shared dependencies for step handlers.

use std::sync::Arc;

use vmix_media::{AssetCache, AssetFetcher, Encoder, FfmpegEncoder};
use vmix_queue::JobBackend;
use vmix_storage::{ObjectStore, R2Client};
use vmix_tts::{ElevenLabsClient, SpeechProvider, VoiceGenerator, VoiceMap};

use crate::config::WorkerConfig;
use crate::error::WorkerResult;

/// Everything a step needs, behind trait objects so tests can swap in fakes.
pub struct WorkerContext {
    pub config: WorkerConfig,
    pub backend: Arc<dyn JobBackend>,
    pub fetcher: AssetFetcher,
    pub voices: VoiceGenerator,
    pub encoder: Arc<dyn Encoder>,
    pub store: Arc<dyn ObjectStore>,
}

impl WorkerContext {
    /// Wire the context from explicit collaborators.
    ///
    /// Downloads and voiceovers share one [`AssetCache`].
    pub fn new(
        config: WorkerConfig,
        backend: Arc<dyn JobBackend>,
        speech: Arc<dyn SpeechProvider>,
        voice_map: Arc<VoiceMap>,
        encoder: Arc<dyn Encoder>,
        store: Arc<dyn ObjectStore>,
    ) -> WorkerResult<Self> {
        let cache = Arc::new(AssetCache::new());
        let fetcher = AssetFetcher::with_cache(config.fetch_config(), Arc::clone(&cache))?;
        let voices = VoiceGenerator::new(speech, voice_map, cache, config.max_voiceover_workers);

        Ok(Self {
            config,
            backend,
            fetcher,
            voices,
            encoder,
            store,
        })
    }

    /// Production wiring: ElevenLabs, FFmpeg and R2 from the environment.
    pub fn from_env(config: WorkerConfig, backend: Arc<dyn JobBackend>) -> WorkerResult<Self> {
        let speech = Arc::new(ElevenLabsClient::from_env()?);
        let encoder = Arc::new(FfmpegEncoder::new(config.render_settings()));
        let store = Arc::new(R2Client::from_env()?);

        Self::new(config, backend, speech, VoiceMap::global(), encoder, store)
    }
}
