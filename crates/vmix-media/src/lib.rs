//! Media pipeline for VMix.
//!
//! This crate provides:
//! - Content-addressed asset cache with per-path single writers
//! - Streaming HTTP fetcher with media type checks
//! - Type-safe FFmpeg command building and a timeout-aware runner
//! - Variant rendering behind the [`Encoder`] trait

pub mod cache;
pub mod command;
pub mod error;
pub mod fetch;
pub mod filters;
pub mod fs_utils;
pub mod mime;
pub mod render;

pub use cache::{AssetCache, CacheEntry};
pub use command::{check_ffmpeg, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use fetch::{AssetFetcher, FetchConfig, FetchedAsset, PreparedMedia};
pub use mime::{extension_for, AUDIO_MPEG, VIDEO_MP4};
pub use render::{result_path, Encoder, FfmpegEncoder, RenderSettings, RenderSpec};
