use std::path::Path;
use async_trait::async_trait;
use crate::assemble::Timeline;
use crate::audio::AudioTrack;
use crate::error::BackendError;
use crate::normalize::Canvas;

/// Fixed encoding profile for every rendered video
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingProfile {
    pub fps: u32,
    pub video_codec: String,
    pub audio_codec: String,
    pub preset: String,
    pub pixel_format: String,
}

impl Default for EncodingProfile {
    fn default() -> Self {
        Self {
            fps: 30,
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            preset: "ultrafast".to_string(),
            pixel_format: "yuv420p".to_string(),
        }
    }
}

/// Everything a backend needs to produce one output file
#[derive(Debug, Clone)]
pub struct RenderPlan {
    pub timeline: Timeline,
    pub audio: Option<AudioTrack>,
    pub profile: EncodingProfile,
}

impl RenderPlan {
    pub fn duration(&self) -> f64 {
        self.timeline.duration()
    }
}

/// Media decode/transform/encode capability the engine orchestrates
///
/// Implementations must be shareable across concurrently running jobs.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Intrinsic duration in seconds of a video or audio file
    async fn probe_duration(&self, path: &Path) -> Result<f64, BackendError>;

    /// Load an image, fit it to `canvas` (resize to height, center-crop or pad) and
    /// write a single still frame to `dest`
    async fn render_still(&self, source: &Path, canvas: Canvas, dest: &Path) -> Result<(), BackendError>;

    /// Render the timeline (and fitted audio, when present) to `output`
    async fn encode(&self, plan: &RenderPlan, output: &Path) -> Result<(), BackendError>;
}
