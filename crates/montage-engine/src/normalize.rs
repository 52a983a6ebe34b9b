use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use log::debug;
use serde::{Deserialize, Serialize};
use crate::asset::{AssetKind, SourceAsset};
use crate::backend::MediaBackend;
use crate::cache::FrameCache;
use crate::error::{EngineError, EngineResult};

/// Fixed on-screen time of the closing image, regardless of per-image duration
pub const CLOSING_DURATION_SECS: f64 = 3.0;

/// Output frame size every segment is fitted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Canvas { width, height }
    }
}

impl Default for Canvas {
    fn default() -> Self {
        Canvas::new(1920, 1080)
    }
}

impl fmt::Display for Canvas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Where a segment's pixels come from
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentSource {
    /// Pre-fitted still frame from the frame cache
    Still(PathBuf),
    /// Video clip, fitted to the canvas at render time
    Clip(PathBuf),
}

impl SegmentSource {
    pub fn path(&self) -> &Path {
        match self {
            SegmentSource::Still(p) | SegmentSource::Clip(p) => p,
        }
    }
}

/// One visual piece of a timeline, already sized for the canvas
#[derive(Debug, Clone, PartialEq)]
pub struct VisualSegment {
    pub source: SegmentSource,
    pub duration: f64,
    pub canvas: Canvas,
}

impl VisualSegment {
    pub fn still(path: impl Into<PathBuf>, duration: f64, canvas: Canvas) -> Self {
        VisualSegment {
            source: SegmentSource::Still(path.into()),
            duration,
            canvas,
        }
    }

    pub fn clip(path: impl Into<PathBuf>, duration: f64, canvas: Canvas) -> Self {
        VisualSegment {
            source: SegmentSource::Clip(path.into()),
            duration,
            canvas,
        }
    }
}

/// Turns resolved source assets into canvas-sized visual segments
pub struct AssetNormalizer {
    backend: Arc<dyn MediaBackend>,
    cache: Arc<FrameCache>,
}

impl AssetNormalizer {
    pub fn new(backend: Arc<dyn MediaBackend>, cache: Arc<FrameCache>) -> Self {
        AssetNormalizer { backend, cache }
    }

    pub fn cache(&self) -> &FrameCache {
        &self.cache
    }

    /// Normalize a selected asset; images last `image_duration`, clips their own length
    pub async fn normalize(
        &self,
        asset: &SourceAsset,
        canvas: Canvas,
        image_duration: f64,
    ) -> EngineResult<VisualSegment> {
        match asset.kind() {
            AssetKind::Video => self.clip(asset, canvas).await,
            AssetKind::Image => self.still(asset.path(), canvas, image_duration).await,
        }
    }

    /// Normalize the closing image; always treated as a still, always 3 seconds
    pub async fn normalize_closing(&self, asset: &SourceAsset, canvas: Canvas) -> EngineResult<VisualSegment> {
        self.still(asset.path(), canvas, CLOSING_DURATION_SECS).await
    }

    async fn clip(&self, asset: &SourceAsset, canvas: Canvas) -> EngineResult<VisualSegment> {
        let duration = self
            .backend
            .probe_duration(asset.path())
            .await
            .map_err(|e| EngineError::unavailable(asset.path(), e.to_string()))?;

        if !duration.is_finite() || duration <= 0.0 {
            return Err(EngineError::unavailable(
                asset.path(),
                format!("clip has no usable duration ({})", duration),
            ));
        }

        debug!("Clip {} lasts {:.2}s", asset.path().display(), duration);
        Ok(VisualSegment::clip(asset.path(), duration, canvas))
    }

    async fn still(&self, source: &Path, canvas: Canvas, duration: f64) -> EngineResult<VisualSegment> {
        let backend = Arc::clone(&self.backend);
        let frame = self
            .cache
            .get_or_create(source, canvas.width, canvas.height, |dest| async move {
                backend.render_still(source, canvas, &dest).await
            })
            .await?;

        Ok(VisualSegment::still(frame, duration, canvas))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBackend;

    fn normalizer(backend: Arc<FakeBackend>, dir: &Path) -> AssetNormalizer {
        let cache = Arc::new(FrameCache::new(dir.join("cache")).unwrap());
        AssetNormalizer::new(backend, cache)
    }

    #[tokio::test]
    async fn test_image_goes_through_cache() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"img").unwrap();
        let backend = Arc::new(FakeBackend::new());
        let normalizer = normalizer(Arc::clone(&backend), dir.path());
        let asset = SourceAsset::resolve("a.jpg", dir.path()).unwrap();
        let canvas = Canvas::new(1080, 1920);

        let first = normalizer.normalize(&asset, canvas, 4.0).await.unwrap();
        let second = normalizer.normalize(&asset, canvas, 4.0).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.duration, 4.0);
        assert!(matches!(first.source, SegmentSource::Still(_)));
        assert!(first.source.path().starts_with(normalizer.cache().dir()));
        assert_eq!(backend.still_calls(), 1);
    }

    #[tokio::test]
    async fn test_video_uses_intrinsic_duration() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.mov"), b"vid").unwrap();
        let backend = Arc::new(FakeBackend::new().with_duration("b.mov", 7.5));
        let normalizer = normalizer(Arc::clone(&backend), dir.path());
        let asset = SourceAsset::resolve("b.mov", dir.path()).unwrap();

        let segment = normalizer.normalize(&asset, Canvas::default(), 2.0).await.unwrap();

        assert_eq!(segment.duration, 7.5);
        assert_eq!(segment.source, SegmentSource::Clip(asset.path().to_path_buf()));
        assert_eq!(backend.still_calls(), 0);
    }

    #[tokio::test]
    async fn test_unprobeable_video_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.mp4"), b"vid").unwrap();
        let backend = Arc::new(FakeBackend::new().failing_probe("bad.mp4"));
        let normalizer = normalizer(backend, dir.path());
        let asset = SourceAsset::resolve("bad.mp4", dir.path()).unwrap();

        let err = normalizer.normalize(&asset, Canvas::default(), 2.0).await.unwrap_err();
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_closing_is_three_seconds() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("end.png"), b"img").unwrap();
        let normalizer = normalizer(Arc::new(FakeBackend::new()), dir.path());
        let asset = SourceAsset::resolve("end.png", dir.path()).unwrap();

        let closing = normalizer.normalize_closing(&asset, Canvas::default()).await.unwrap();
        assert_eq!(closing.duration, CLOSING_DURATION_SECS);
    }

    #[tokio::test]
    async fn test_still_render_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("c.jpg"), b"img").unwrap();
        let normalizer = normalizer(Arc::new(FakeBackend::new().failing_still("c.jpg")), dir.path());
        let asset = SourceAsset::resolve("c.jpg", dir.path()).unwrap();

        let err = normalizer.normalize(&asset, Canvas::default(), 2.0).await.unwrap_err();
        assert!(matches!(err, EngineError::CacheWriteFailure { .. }));
        assert!(!err.is_recoverable());
    }
}
