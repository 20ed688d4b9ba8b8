//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use vmix_media::{FetchConfig, RenderSettings};
use vmix_queue::QueueClass;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Root under which `task_<id>` directories are created
    pub work_dir: PathBuf,
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Download pool size per task
    pub max_download_workers: usize,
    /// Voiceover pool size per task
    pub max_voiceover_workers: usize,
    /// Buffer size for streamed downloads
    pub download_chunk_size: usize,
    /// Transport timeout for downloads
    pub download_timeout: Duration,
    /// Output frame width
    pub video_width: u32,
    /// Output frame height
    pub video_height: u32,
    /// Upper bound on combinations per request
    pub max_combinations: u64,
    /// FFmpeg timeout per render
    pub render_timeout: Duration,
    /// Queue classes this worker consumes
    pub queues: Vec<QueueClass>,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// How often the worker should scan for orphaned pending jobs
    pub claim_interval: Duration,
    /// Minimum idle time before a pending job can be claimed
    pub claim_min_idle: Duration,
    /// Address for the Prometheus exporter, if any
    pub metrics_addr: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/tmp"),
            max_concurrent_jobs: 2,
            max_download_workers: 10,
            max_voiceover_workers: 3,
            download_chunk_size: 16 * 1024,
            download_timeout: Duration::from_secs(300),
            video_width: 1080,
            video_height: 1920,
            max_combinations: 4000,
            render_timeout: Duration::from_secs(1800),
            queues: QueueClass::ALL.to_vec(),
            shutdown_timeout: Duration::from_secs(60),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(300), // 5 minutes
            metrics_addr: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            max_concurrent_jobs: env_parse("WORKER_MAX_JOBS").unwrap_or(defaults.max_concurrent_jobs),
            max_download_workers: env_parse("MAX_DOWNLOAD_WORKERS")
                .unwrap_or(defaults.max_download_workers),
            max_voiceover_workers: env_parse("MAX_VOICEOVER_WORKERS")
                .unwrap_or(defaults.max_voiceover_workers),
            download_chunk_size: env_parse("DOWNLOAD_CHUNK_SIZE")
                .unwrap_or(defaults.download_chunk_size),
            download_timeout: env_parse("DOWNLOAD_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.download_timeout),
            video_width: env_parse("VIDEO_WIDTH").unwrap_or(defaults.video_width),
            video_height: env_parse("VIDEO_HEIGHT").unwrap_or(defaults.video_height),
            max_combinations: env_parse("MAX_COMBINATIONS").unwrap_or(defaults.max_combinations),
            render_timeout: env_parse("RENDER_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.render_timeout),
            queues: std::env::var("WORKER_QUEUES")
                .ok()
                .map(|s| parse_queues(&s))
                .filter(|q| !q.is_empty())
                .unwrap_or(defaults.queues),
            shutdown_timeout: env_parse("WORKER_SHUTDOWN_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
            claim_interval: env_parse("WORKER_CLAIM_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.claim_interval),
            claim_min_idle: env_parse("WORKER_CLAIM_MIN_IDLE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.claim_min_idle),
            metrics_addr: std::env::var("WORKER_METRICS_ADDR").ok().filter(|s| !s.is_empty()),
        }
    }

    /// Download settings for the asset fetcher.
    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            max_workers: self.max_download_workers,
            chunk_size: self.download_chunk_size,
            timeout: self.download_timeout,
        }
    }

    /// Encoder settings derived from the frame size and render timeout.
    pub fn render_settings(&self) -> RenderSettings {
        RenderSettings {
            width: self.video_width,
            height: self.video_height,
            timeout_secs: self.render_timeout.as_secs(),
            ..RenderSettings::default()
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

/// Parse a comma-separated class list, skipping unknown names.
fn parse_queues(raw: &str) -> Vec<QueueClass> {
    let mut queues = Vec::new();
    for part in raw.split(',').filter(|p| !p.trim().is_empty()) {
        match part.parse::<QueueClass>() {
            Ok(class) if !queues.contains(&class) => queues.push(class),
            Ok(_) => {}
            Err(e) => tracing::warn!("Ignoring WORKER_QUEUES entry: {}", e),
        }
    }
    queues
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.max_download_workers, 10);
        assert_eq!(config.max_voiceover_workers, 3);
        assert_eq!(config.download_chunk_size, 16384);
        assert_eq!(config.max_combinations, 4000);
        assert_eq!(config.queues, QueueClass::ALL.to_vec());
    }

    #[test]
    fn test_parse_queues() {
        assert_eq!(
            parse_queues("heavy, light,heavy,bogus"),
            vec![QueueClass::Heavy, QueueClass::Light]
        );
        assert!(parse_queues(" , ").is_empty());
    }

    #[test]
    fn test_render_settings_follow_frame_size() {
        let config = WorkerConfig {
            video_width: 720,
            video_height: 1280,
            ..WorkerConfig::default()
        };
        let settings = config.render_settings();
        assert_eq!((settings.width, settings.height), (720, 1280));
        assert_eq!(settings.timeout_secs, 1800);
    }
}
