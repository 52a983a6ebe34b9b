use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use log::debug;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use uuid::Uuid;
use crate::error::{BackendError, EngineError, EngineResult};

/// Name of the scratch folder used when no cache directory is configured
pub const DEFAULT_CACHE_DIR_NAME: &str = "video_export_cache";

/// Extension of every cached still frame
const FRAME_EXTENSION: &str = "png";

/// Content+geometry address of a processed still frame
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Digest of (absolute source path, target width, target height)
    pub fn new(source: &Path, width: u32, height: u32) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(source.as_os_str().as_encoded_bytes());
        hasher.update([0u8]);
        hasher.update(width.to_be_bytes());
        hasher.update(height.to_be_bytes());
        let digest = hasher.finalize();

        let mut hex = String::with_capacity(digest.len() * 2);
        for b in digest {
            hex.push_str(&format!("{:02x}", b));
        }
        CacheKey(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hit/miss counters since construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// On-disk store of resized/cropped/padded still frames shared by all jobs of a run
///
/// Entries are write-once: a frame is produced into a uniquely named temp file in
/// the cache directory and renamed into place, so readers never observe a partial
/// file. The check-then-produce sequence is serialized by `write_lock`.
pub struct FrameCache {
    dir: PathBuf,
    write_lock: Mutex<()>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl FrameCache {
    /// Open (and create if needed) a cache rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> EngineResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| EngineError::io(format!("failed to create cache directory {}", dir.display()), e))?;

        debug!("Frame cache at {}", dir.display());

        Ok(FrameCache {
            dir,
            write_lock: Mutex::new(()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// Default scratch location under the system temp directory
    pub fn default_dir() -> PathBuf {
        std::env::temp_dir().join(DEFAULT_CACHE_DIR_NAME)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Final location of the entry for `key`
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}.{}", key, FRAME_EXTENSION))
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Return the cached frame for (source, width, height), producing it on first use
    ///
    /// `produce` is handed a temporary path and must write the still frame there.
    /// It runs at most once per key for the lifetime of the cache directory; callers
    /// racing on the same key wait for the first writer and then share its entry.
    pub async fn get_or_create<F, Fut>(
        &self,
        source: &Path,
        width: u32,
        height: u32,
        produce: F,
    ) -> EngineResult<PathBuf>
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: Future<Output = Result<(), BackendError>>,
    {
        let key = CacheKey::new(source, width, height);
        let dest = self.entry_path(&key);

        if is_file(&dest).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(dest);
        }

        let _guard = self.write_lock.lock().await;

        // Another caller may have finished the entry while we waited
        if is_file(&dest).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(dest);
        }

        let temp = self.dir.join(format!(".{}.{}.{}", key, Uuid::new_v4().simple(), FRAME_EXTENSION));
        debug!("Cache miss for {} ({}x{}), producing {}", source.display(), width, height, key);

        if let Err(e) = produce(temp.clone()).await {
            discard(&temp).await;
            return Err(EngineError::CacheWriteFailure {
                path: source.to_path_buf(),
                reason: e.to_string(),
            });
        }

        if !is_file(&temp).await {
            return Err(EngineError::CacheWriteFailure {
                path: source.to_path_buf(),
                reason: "producer finished without writing a frame".to_string(),
            });
        }

        if let Err(e) = tokio::fs::rename(&temp, &dest).await {
            discard(&temp).await;
            return Err(EngineError::CacheWriteFailure {
                path: source.to_path_buf(),
                reason: format!("failed to move frame into {}: {}", dest.display(), e),
            });
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok(dest)
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            debug!("Could not remove partial frame {}: {}", path.display(), e);
        }
    }
}
