//! Cached voiceover synthesis.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures_util::{stream, StreamExt, TryStreamExt};
use metrics::counter;
use tracing::info;

use vmix_media::{AssetCache, AUDIO_MPEG};
use vmix_models::SpeechText;

use crate::client::SpeechProvider;
use crate::error::{TtsError, TtsResult};
use crate::voices::VoiceMap;

/// Produces voiceover files for (text, voice) pairs.
///
/// Files are keyed by the text and the resolved voice id, so two names for
/// the same voice share one file.
pub struct VoiceGenerator {
    provider: Arc<dyn SpeechProvider>,
    voices: Arc<VoiceMap>,
    cache: Arc<AssetCache>,
    max_workers: usize,
}

impl VoiceGenerator {
    pub fn new(
        provider: Arc<dyn SpeechProvider>,
        voices: Arc<VoiceMap>,
        cache: Arc<AssetCache>,
        max_workers: usize,
    ) -> Self {
        Self {
            provider,
            voices,
            cache,
            max_workers: max_workers.max(1),
        }
    }

    /// Resolve a human voice name to a provider id.
    pub async fn resolve_voice(&self, name: &str) -> TtsResult<String> {
        self.voices.resolve(name, self.provider.as_ref()).await
    }

    /// Load the voice map if it has not been loaded yet.
    pub async fn refresh_voice_map(&self) -> TtsResult<()> {
        self.voices.refresh(self.provider.as_ref()).await?;
        Ok(())
    }

    /// Return the voiceover for `text` spoken by `voice`, synthesizing on a miss.
    pub async fn generate_voiceover(&self, text: &str, voice: &str, folder: &Path) -> TtsResult<PathBuf> {
        let voice_id = self.resolve_voice(voice).await?;
        let identity = format!("{}|{}", text, voice_id);
        let path = AssetCache::entry_path(folder, &identity, AUDIO_MPEG)?;

        let start = Instant::now();
        let entry = self
            .cache
            .get_or_create(path, |partial| async move {
                let audio = self.provider.synthesize(text, &voice_id).await?;
                tokio::fs::write(&partial, &audio).await?;
                Ok::<_, TtsError>(audio.len() as u64)
            })
            .await?;

        if entry.hit {
            counter!("vmix_voiceovers_total", "outcome" => "cache_hit").increment(1);
            info!(path = %entry.path.display(), "Voiceover already exists, using cached copy");
        } else {
            counter!("vmix_voiceovers_total", "outcome" => "generated").increment(1);
            info!(
                voice = %voice,
                "Voiceover generated in {:.2}s",
                start.elapsed().as_secs_f64()
            );
        }

        Ok(entry.path)
    }

    /// Generate every voiceover of a request, preserving input order.
    ///
    /// The first failure aborts the batch.
    pub async fn prepare_voiceovers(&self, items: &[SpeechText], folder: &Path) -> TtsResult<Vec<PathBuf>> {
        self.refresh_voice_map().await?;

        stream::iter(items)
            .map(|item| self.generate_voiceover(&item.text, &item.voice, folder))
            .buffered(self.max_workers)
            .boxed()
            .try_collect()
            .await
    }
}
