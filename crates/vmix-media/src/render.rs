//! Variant rendering: concatenated clips over mixed music and voiceover.

use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::filters::build_mix_filter;

/// Inputs for one rendered variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderSpec {
    /// One clip per block, in block order
    pub videos: Vec<PathBuf>,
    /// Background track, looped to cover the clips
    pub music: PathBuf,
    /// Voiceover track
    pub voiceover: PathBuf,
    /// Zero-based combination index
    pub index: usize,
    /// Number of combinations in the task
    pub total: usize,
    /// Task `results/` directory
    pub output_dir: PathBuf,
}

impl RenderSpec {
    /// `results/result_<index+1>.mp4`
    pub fn output_path(&self) -> PathBuf {
        result_path(&self.output_dir, self.index)
    }
}

/// Output location for combination `index`.
pub fn result_path(output_dir: &Path, index: usize) -> PathBuf {
    output_dir.join(format!("result_{}.mp4", index + 1))
}

/// Encoder settings shared by every variant.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub width: u32,
    pub height: u32,
    pub crf: u8,
    pub preset: String,
    pub timeout_secs: u64,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            crf: 28,
            preset: "veryfast".to_string(),
            timeout_secs: 1800,
        }
    }
}

/// Turns a [`RenderSpec`] into a file.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Render the variant and return the output path.
    async fn encode(&self, spec: &RenderSpec) -> MediaResult<PathBuf>;
}

/// Build the FFmpeg invocation for a variant.
pub fn build_render_command(spec: &RenderSpec, settings: &RenderSettings) -> MediaResult<FfmpegCommand> {
    if spec.videos.is_empty() {
        return Err(MediaError::internal("render requires at least one clip"));
    }

    let mut cmd = FfmpegCommand::new(spec.output_path());
    for video in &spec.videos {
        cmd = cmd.input(video);
    }

    let cmd = cmd
        .input_with(["-stream_loop", "-1"], &spec.music)
        .input(&spec.voiceover)
        .filter_complex(build_mix_filter(spec.videos.len(), settings.width, settings.height))
        .map("[v]")
        .map("[a]")
        .video_codec("libx264")
        .crf(settings.crf)
        .audio_codec("aac")
        .preset(settings.preset.clone())
        .shortest();

    Ok(cmd)
}

/// [`Encoder`] backed by the FFmpeg CLI.
#[derive(Debug, Clone, Default)]
pub struct FfmpegEncoder {
    settings: RenderSettings,
}

impl FfmpegEncoder {
    pub fn new(settings: RenderSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn encode(&self, spec: &RenderSpec) -> MediaResult<PathBuf> {
        let start = Instant::now();
        fs::create_dir_all(&spec.output_dir).await?;

        let cmd = build_render_command(spec, &self.settings)?;
        FfmpegRunner::new()
            .with_timeout(self.settings.timeout_secs)
            .run(&cmd)
            .await?;

        info!(
            index = spec.index,
            "[{}/{}] Rendered in {:.2}s",
            spec.index + 1,
            spec.total,
            start.elapsed().as_secs_f64()
        );

        Ok(spec.output_path())
    }
}
