//! HTTP asset fetcher backed by [`AssetCache`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{stream, StreamExt, TryStreamExt};
use metrics::counter;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};

use vmix_models::ordered_block_names;

use crate::cache::{AssetCache, CacheEntry};
use crate::error::{MediaError, MediaResult};
use crate::mime::{content_type_matches, AUDIO_MPEG, VIDEO_MP4};

/// Fetcher tuning.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Concurrent downloads per batch
    pub max_workers: usize,
    /// Write buffer size for streamed bodies
    pub chunk_size: usize,
    /// Whole-request timeout
    pub timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_workers: 10,
            chunk_size: 16 * 1024,
            timeout: Duration::from_secs(300),
        }
    }
}

/// A fetched (or already cached) asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedAsset {
    pub source: String,
    pub path: PathBuf,
    pub size: u64,
    pub cached: bool,
}

/// Local paths for every clip and track of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreparedMedia {
    /// Blocks in render order, each with its clips in request order
    pub videos_by_block: Vec<(String, Vec<PathBuf>)>,
    /// Background tracks in first-appearance order
    pub audio: Vec<PathBuf>,
}

/// Downloads remote media into per-task folders.
pub struct AssetFetcher {
    http: Client,
    cache: Arc<AssetCache>,
    config: FetchConfig,
}

impl AssetFetcher {
    /// Create a fetcher with its own cache.
    pub fn new(config: FetchConfig) -> MediaResult<Self> {
        Self::with_cache(config, Arc::new(AssetCache::new()))
    }

    /// Create a fetcher sharing an existing cache.
    pub fn with_cache(config: FetchConfig, cache: Arc<AssetCache>) -> MediaResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| MediaError::internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            cache,
            config,
        })
    }

    /// Fetch one URL into `folder`, reusing a cached copy when present.
    pub async fn fetch(
        &self,
        url: &str,
        folder: &Path,
        media_type: &str,
    ) -> MediaResult<FetchedAsset> {
        let path = AssetCache::entry_path(folder, url, media_type)?;

        let CacheEntry { path, size, hit } = self
            .cache
            .get_or_create(path, |partial| self.download(url, partial, media_type))
            .await?;

        if hit {
            counter!("vmix_asset_fetches_total", "outcome" => "cache_hit").increment(1);
            info!(url = %url, path = %path.display(), "File already exists, using cached copy");
        } else {
            counter!("vmix_asset_fetches_total", "outcome" => "downloaded").increment(1);
        }

        Ok(FetchedAsset {
            source: url.to_string(),
            path,
            size,
            cached: hit,
        })
    }

    /// Fetch every clip and track of a request.
    ///
    /// Each distinct URL is transferred at most once. The first failure
    /// aborts the batch and nothing partial is returned.
    pub async fn prepare_media(
        &self,
        video_blocks: &BTreeMap<String, Vec<String>>,
        audio_blocks: &BTreeMap<String, Vec<String>>,
        videos_dir: &Path,
        audio_dir: &Path,
    ) -> MediaResult<PreparedMedia> {
        let start = Instant::now();

        let video_urls = unique_in_order(video_blocks.values().flatten().map(String::as_str));
        let audio_urls = unique_in_order(audio_blocks.values().flatten().map(String::as_str));

        let jobs = video_urls
            .iter()
            .map(|url| (*url, videos_dir, VIDEO_MP4))
            .chain(audio_urls.iter().map(|url| (*url, audio_dir, AUDIO_MPEG)));

        let fetched: HashMap<(String, &'static str), FetchedAsset> = stream::iter(jobs)
            .map(|(url, folder, media_type)| async move {
                let asset = self.fetch(url, folder, media_type).await?;
                Ok::<_, MediaError>(((url.to_string(), media_type), asset))
            })
            .buffer_unordered(self.config.max_workers.max(1))
            .boxed()
            .try_collect()
            .await?;

        let lookup = |url: &str, media_type: &'static str| -> MediaResult<PathBuf> {
            fetched
                .get(&(url.to_string(), media_type))
                .map(|a| a.path.clone())
                .ok_or_else(|| MediaError::internal(format!("missing fetched asset for {}", url)))
        };

        let mut videos_by_block = Vec::with_capacity(video_blocks.len());
        for name in ordered_block_names(video_blocks.keys().map(String::as_str)) {
            let paths = video_blocks[name]
                .iter()
                .map(|url| lookup(url, VIDEO_MP4))
                .collect::<MediaResult<Vec<_>>>()?;
            videos_by_block.push((name.to_string(), paths));
        }

        let audio = audio_urls
            .iter()
            .map(|url| lookup(url, AUDIO_MPEG))
            .collect::<MediaResult<Vec<_>>>()?;

        let total_bytes: u64 = fetched.values().filter(|a| !a.cached).map(|a| a.size).sum();
        info!(
            videos = video_urls.len(),
            audio = audio_urls.len(),
            "Downloaded {:.2} MB in {:.2}s",
            total_bytes as f64 / (1024.0 * 1024.0),
            start.elapsed().as_secs_f64()
        );

        Ok(PreparedMedia {
            videos_by_block,
            audio,
        })
    }

    /// Stream a response body into `partial`.
    async fn download(&self, url: &str, partial: PathBuf, media_type: &str) -> MediaResult<u64> {
        debug!(url = %url, "Downloading");

        let response = self.http.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::transport(format!("{} returned {}", url, status)));
        }

        let declared = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if !content_type_matches(&declared, media_type) {
            return Err(MediaError::type_mismatch(media_type, declared));
        }

        let file = File::create(&partial).await?;
        let mut writer = BufWriter::with_capacity(self.config.chunk_size.max(1), file);
        let mut body = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        writer.flush().await?;

        Ok(written)
    }
}

fn unique_in_order<'a>(items: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    items.filter(|item| seen.insert(*item)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> AssetFetcher {
        AssetFetcher::new(FetchConfig {
            max_workers: 4,
            chunk_size: 8,
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn mp4(body: &'static [u8]) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .insert_header("content-type", "video/mp4")
            .set_body_bytes(body)
    }

    #[tokio::test]
    async fn test_same_url_transfers_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.mp4"))
            .respond_with(mp4(b"0123456789abcdef0123"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let f = fetcher();
        let url = format!("{}/a.mp4", server.uri());

        let first = f.fetch(&url, dir.path(), VIDEO_MP4).await.unwrap();
        let second = f.fetch(&url, dir.path(), VIDEO_MP4).await.unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.path, second.path);
        assert_eq!(first.size, 20);
        assert_eq!(std::fs::read(&first.path).unwrap(), b"0123456789abcdef0123");
    }

    #[tokio::test]
    async fn test_content_type_mismatch_leaves_no_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string("<html></html>"),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let err = fetcher()
            .fetch(&format!("{}/page", server.uri()), dir.path(), VIDEO_MP4)
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::MediaTypeMismatch { .. }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_error_status_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let err = fetcher()
            .fetch(&format!("{}/missing.mp3", server.uri()), dir.path(), AUDIO_MPEG)
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::Transport(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_prepare_media_dedups_and_orders_blocks() {
        let server = MockServer::start().await;
        for name in ["a", "b", "c"] {
            Mock::given(method("GET"))
                .and(path(format!("/{}.mp4", name)))
                .respond_with(mp4(b"video"))
                .expect(1)
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/x.mp3"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "audio/mpeg")
                    .set_body_bytes(b"audio".as_slice()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let u = |p: &str| format!("{}/{}", server.uri(), p);
        let mut video_blocks = BTreeMap::new();
        video_blocks.insert("block_10".to_string(), vec![u("c.mp4")]);
        video_blocks.insert("block_2".to_string(), vec![u("a.mp4"), u("b.mp4")]);
        video_blocks.insert("block_3".to_string(), vec![u("a.mp4")]);
        let mut audio_blocks = BTreeMap::new();
        audio_blocks.insert("music".to_string(), vec![u("x.mp3"), u("x.mp3")]);

        let dir = TempDir::new().unwrap();
        let videos = dir.path().join("videos");
        let audio = dir.path().join("audio");

        let prepared = fetcher()
            .prepare_media(&video_blocks, &audio_blocks, &videos, &audio)
            .await
            .unwrap();

        let names: Vec<&str> = prepared
            .videos_by_block
            .iter()
            .map(|(n, _)| n.as_str())
            .collect();
        assert_eq!(names, vec!["block_2", "block_3", "block_10"]);
        assert_eq!(prepared.videos_by_block[0].1.len(), 2);
        assert_eq!(prepared.videos_by_block[0].1[0], prepared.videos_by_block[1].1[0]);
        assert_eq!(prepared.audio.len(), 1);
        assert!(prepared.audio[0].starts_with(&audio));
    }

    #[tokio::test]
    async fn test_prepare_media_fails_as_a_batch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok.mp4"))
            .respond_with(mp4(b"fine"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/bad.mp3"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut video_blocks = BTreeMap::new();
        video_blocks.insert("block_1".to_string(), vec![format!("{}/ok.mp4", server.uri())]);
        let mut audio_blocks = BTreeMap::new();
        audio_blocks.insert("m".to_string(), vec![format!("{}/bad.mp3", server.uri())]);

        let dir = TempDir::new().unwrap();
        let result = fetcher()
            .prepare_media(
                &video_blocks,
                &audio_blocks,
                &dir.path().join("videos"),
                &dir.path().join("audio"),
            )
            .await;

        assert!(matches!(result, Err(MediaError::Transport(_))));
    }
}
