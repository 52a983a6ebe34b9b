use std::path::{Path, PathBuf};
use crate::error::{EngineError, EngineResult};

/// Extensions loaded as video clips; everything else is treated as an image
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "m4v", "webm"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Image,
    Video,
}

impl AssetKind {
    /// Classify a path by its extension (case-insensitive)
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_lowercase());

        match ext {
            Some(ext) if VIDEO_EXTENSIONS.contains(&ext.as_str()) => AssetKind::Video,
            _ => AssetKind::Image,
        }
    }
}

/// A source file resolved to an absolute path that exists on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceAsset {
    path: PathBuf,
    kind: AssetKind,
}

impl SourceAsset {
    /// Resolve a catalog entry against `base_dir` and check that it is a regular file
    pub fn resolve(entry: impl AsRef<Path>, base_dir: &Path) -> EngineResult<Self> {
        let entry = entry.as_ref();
        if entry.as_os_str().is_empty() {
            return Err(EngineError::unavailable(entry, "empty path"));
        }

        let joined = if entry.is_absolute() {
            entry.to_path_buf()
        } else {
            base_dir.join(entry)
        };
        let path = std::path::absolute(&joined)
            .map_err(|e| EngineError::unavailable(&joined, e.to_string()))?;

        match std::fs::metadata(&path) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(EngineError::unavailable(path, "not a regular file")),
            Err(e) => return Err(EngineError::unavailable(path, e.to_string())),
        }

        let kind = AssetKind::from_path(&path);
        Ok(SourceAsset { path, kind })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> AssetKind {
        self.kind
    }

    pub fn is_video(&self) -> bool {
        self.kind == AssetKind::Video
    }
}
