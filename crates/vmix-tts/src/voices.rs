//! Process-wide voice name → voice id map.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use tracing::info;

use crate::client::SpeechProvider;
use crate::error::{TtsError, TtsResult};
use crate::types::Voice;

static GLOBAL: OnceLock<Arc<VoiceMap>> = OnceLock::new();

/// Lazily built lookup from lower-cased voice names to provider ids.
///
/// Each voice is reachable by its full name and by its first word, so
/// "Rachel - calm & quiet" answers to both `rachel - calm & quiet` and
/// `rachel`. The map is filled once and never expires.
#[derive(Debug, Default)]
pub struct VoiceMap {
    voices: RwLock<HashMap<String, String>>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl VoiceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared instance for the whole process.
    pub fn global() -> Arc<VoiceMap> {
        GLOBAL.get_or_init(|| Arc::new(VoiceMap::new())).clone()
    }

    pub fn len(&self) -> usize {
        self.voices.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Case-insensitive lookup without touching the provider.
    pub fn lookup(&self, name: &str) -> Option<String> {
        let key = name.trim().to_lowercase();
        self.voices.read().ok()?.get(&key).cloned()
    }

    /// Insert voices in provider order. Later entries overwrite earlier ones.
    pub fn insert_voices(&self, voices: &[Voice]) {
        let mut map = self.voices.write().unwrap_or_else(|e| e.into_inner());
        for voice in voices {
            let full = voice.name.trim().to_lowercase();
            if let Some(first) = full.split_whitespace().next() {
                let first = first.to_string();
                map.insert(full.clone(), voice.voice_id.clone());
                map.insert(first, voice.voice_id.clone());
            }
        }
    }

    /// Populate the map from the provider if it is still empty.
    ///
    /// Returns `true` when this call performed the listing. Concurrent
    /// callers share a single listing.
    pub async fn refresh(&self, provider: &dyn SpeechProvider) -> TtsResult<bool> {
        if !self.is_empty() {
            return Ok(false);
        }

        let _guard = self.refresh_lock.lock().await;
        if !self.is_empty() {
            return Ok(false);
        }

        let voices = provider.list_voices().await?;
        self.insert_voices(&voices);
        info!(voices = voices.len(), entries = self.len(), "Voice map loaded");
        Ok(true)
    }

    /// Resolve a voice name, loading the map on first use.
    pub async fn resolve(&self, name: &str, provider: &dyn SpeechProvider) -> TtsResult<String> {
        if let Some(id) = self.lookup(name) {
            return Ok(id);
        }
        self.refresh(provider).await?;
        self.lookup(name)
            .ok_or_else(|| TtsError::voice_not_found(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ListingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SpeechProvider for ListingProvider {
        async fn list_voices(&self) -> TtsResult<Vec<Voice>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![
                Voice::new("Rachel - calm & quiet", "v-rachel"),
                Voice::new("Adam", "v-adam"),
            ])
        }

        async fn synthesize(&self, _text: &str, _voice_id: &str) -> TtsResult<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_first_token_alias() {
        let map = VoiceMap::new();
        map.insert_voices(&[Voice::new("Rachel - calm & quiet", "v1")]);
        assert_eq!(map.lookup("RACHEL").as_deref(), Some("v1"));
        assert_eq!(map.lookup("rachel - calm & quiet").as_deref(), Some("v1"));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_later_voice_wins_shared_token() {
        let map = VoiceMap::new();
        map.insert_voices(&[Voice::new("Sam One", "a"), Voice::new("Sam Two", "b")]);
        assert_eq!(map.lookup("sam").as_deref(), Some("b"));
        assert_eq!(map.lookup("sam one").as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_refresh_happens_once() {
        let map = VoiceMap::new();
        let provider = ListingProvider {
            calls: AtomicUsize::new(0),
        };

        assert_eq!(map.resolve("adam", &provider).await.unwrap(), "v-adam");
        assert_eq!(map.resolve("Rachel", &provider).await.unwrap(), "v-rachel");
        assert!(matches!(
            map.resolve("nobody", &provider).await,
            Err(TtsError::VoiceNotFound(_))
        ));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }
}
