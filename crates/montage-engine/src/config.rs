use std::path::{Path, PathBuf};
use anyhow::{bail, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use crate::cache::FrameCache;
use crate::normalize::Canvas;
use crate::scheduler::DEFAULT_CONCURRENCY;

/// Per-batch export settings, read-only once the batch is dispatched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportParameters {
    /// Sources drawn from the category pool for each video
    pub images_per_video: usize,
    /// Number of videos rendered per invocation
    pub output_videos: usize,
    pub width: u32,
    pub height: u32,
    /// Seconds each image stays on screen
    pub per_image_secs: f64,
    /// Crossfade overlap in seconds; should be shorter than `per_image_secs`
    pub fade_secs: f64,
    /// Background audio, looped or trimmed to the video length
    pub audio: Option<PathBuf>,
    /// Folder receiving `video_{n}.mp4`
    pub output_dir: PathBuf,
    pub crossfade: bool,
    /// Still shown for three seconds after the main body
    pub closing_image: Option<PathBuf>,
}

impl Default for ExportParameters {
    fn default() -> Self {
        Self {
            images_per_video: 5,
            output_videos: 1,
            width: 1920,
            height: 1080,
            per_image_secs: 3.0,
            fade_secs: 1.0,
            audio: None,
            output_dir: PathBuf::from("."),
            crossfade: true,
            closing_image: None,
        }
    }
}

impl ExportParameters {
    pub fn canvas(&self) -> Canvas {
        Canvas::new(self.width, self.height)
    }

    /// Reject settings that cannot produce a video; warn about ones that look bad
    pub fn validate(&self) -> Result<()> {
        if self.images_per_video == 0 {
            bail!("images per video must be at least 1");
        }
        if self.output_videos == 0 {
            bail!("number of output videos must be at least 1");
        }
        if self.width == 0 || self.height == 0 {
            bail!("invalid output size {}x{}", self.width, self.height);
        }
        if !(self.per_image_secs > 0.0) {
            bail!("per image time must be positive, got {}", self.per_image_secs);
        }
        if self.fade_secs < 0.0 {
            bail!("fade duration cannot be negative, got {}", self.fade_secs);
        }
        if !self.output_dir.is_dir() {
            bail!("Please select a valid output folder: {}", self.output_dir.display());
        }

        if self.crossfade && self.fade_secs >= self.per_image_secs {
            warn!("Fade duration ({}s) is not shorter than per image time ({}s); crossfades will look wrong",
                  self.fade_secs, self.per_image_secs);
        }

        Ok(())
    }
}

/// Full configuration for a montage run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MontageConfig {
    /// Jobs rendered at the same time
    pub concurrency: usize,
    /// Scratch directory holding processed still frames
    pub cache_dir: PathBuf,
    /// Directory relative catalog entries are resolved against; defaults to the
    /// catalog's directory when unset
    pub base_dir: Option<PathBuf>,
    /// Seed for source selection; random per run when unset
    pub seed: Option<u64>,
    /// Path to ffmpeg binary
    pub ffmpeg_bin: PathBuf,
    /// Path to ffprobe binary
    pub ffprobe_bin: PathBuf,
    /// Kill an ffmpeg invocation after this many seconds
    pub ffmpeg_timeout_secs: Option<u64>,
    /// Named output ratio preset (e.g. "instagram-reel"); overrides width/height
    pub preset: Option<String>,
    pub export: ExportParameters,
}

impl Default for MontageConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

impl MontageConfig {
    /// Create a default configuration with sensible values
    pub fn default_config() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            cache_dir: FrameCache::default_dir(),
            base_dir: None,
            seed: None,
            ffmpeg_bin: PathBuf::from("ffmpeg"),
            ffprobe_bin: PathBuf::from("ffprobe"),
            ffmpeg_timeout_secs: None,
            preset: None,
            export: ExportParameters::default(),
        }
    }

    /// Load configuration from a file, or return defaults if path is None or file doesn't exist
    pub fn load_config(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default_config();

        if let Some(config_path) = path {
            if config_path.exists() {
                let content = std::fs::read_to_string(config_path)
                    .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

                // TOML by extension, JSON otherwise
                if config_path.extension().and_then(|s| s.to_str()) == Some("toml") {
                    config = toml::from_str(&content)
                        .with_context(|| format!("Failed to parse TOML config: {}", config_path.display()))?;
                } else {
                    config = serde_json::from_str(&content)
                        .with_context(|| format!("Failed to parse JSON config: {}", config_path.display()))?;
                }
            } else {
                warn!("Config file {} not found, using defaults", config_path.display());
            }
        }

        Ok(config)
    }
}
