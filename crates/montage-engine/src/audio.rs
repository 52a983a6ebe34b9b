use std::path::{Path, PathBuf};
use log::{debug, warn};
use crate::backend::MediaBackend;
use crate::error::{EngineError, EngineResult};

/// Audio source fitted to an exact output duration
#[derive(Debug, Clone, PartialEq)]
pub struct AudioTrack {
    pub source: PathBuf,
    /// Intrinsic length of the source in seconds
    pub source_duration: f64,
    /// Extra plays appended after the first one
    pub loops: u32,
    pub start: f64,
    pub duration: f64,
}

impl AudioTrack {
    /// Loop a short source or trim a long one so it lasts exactly `target` seconds
    pub fn fitted(source: impl Into<PathBuf>, source_duration: f64, target: f64) -> Self {
        let loops = if source_duration >= target {
            0
        } else {
            ((target / source_duration).ceil() as u32).saturating_sub(1)
        };

        AudioTrack {
            source: source.into(),
            source_duration,
            loops,
            start: 0.0,
            duration: target,
        }
    }

    /// Seconds of audio available before trimming
    pub fn coverage(&self) -> f64 {
        self.source_duration * f64::from(self.loops + 1)
    }

    pub fn is_looped(&self) -> bool {
        self.loops > 0
    }
}

/// Fit `audio` to `target` seconds, or `None` when there is nothing usable to fit
///
/// A configured path that is missing on disk is not an error; the video is
/// rendered silent. A file that exists but cannot be probed is.
pub async fn fit(
    backend: &dyn MediaBackend,
    audio: Option<&Path>,
    target: f64,
) -> EngineResult<Option<AudioTrack>> {
    let Some(path) = audio.filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(None);
    };

    if !path.is_file() {
        warn!("Audio file not found, rendering without audio: {}", path.display());
        return Ok(None);
    }

    let source_duration = backend
        .probe_duration(path)
        .await
        .map_err(|e| EngineError::unavailable(path, e.to_string()))?;

    if !source_duration.is_finite() || source_duration <= 0.0 {
        warn!("Audio file {} has no usable duration ({}), rendering without audio",
              path.display(), source_duration);
        return Ok(None);
    }

    let track = AudioTrack::fitted(path, source_duration, target);
    debug!("Audio {} ({:.2}s) fitted to {:.2}s with {} extra loop(s)",
           path.display(), source_duration, target, track.loops);
    Ok(Some(track))
}
