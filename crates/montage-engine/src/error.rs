use std::path::PathBuf;
use thiserror::Error;

/// Failures raised by a media backend while probing, rendering stills or encoding
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} failed (exit code {code}): {stderr}")]
    Failed {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("{program} timed out after {secs} seconds and was killed")]
    Timeout { program: String, secs: u64 },

    #[error("could not read media info for {path}: {reason}")]
    Probe { path: PathBuf, reason: String },

    #[error("{0}")]
    Other(String),
}

/// Errors produced along the compilation pipeline
///
/// `AssetUnavailable` is recoverable at the job level (the asset is skipped).
/// Every other variant ends the job with a `Failed` outcome.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("asset unavailable: {path}: {reason}")]
    AssetUnavailable { path: PathBuf, reason: String },

    #[error("no usable assets out of {selected} selected")]
    NoUsableAssets { selected: usize },

    #[error("cannot assemble a timeline from zero segments")]
    EmptySegmentList,

    #[error("failed to write cached frame for {path}: {reason}")]
    CacheWriteFailure { path: PathBuf, reason: String },

    #[error("encoding failed: {0}")]
    EncodeFailure(#[source] BackendError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl EngineError {
    pub(crate) fn unavailable(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        EngineError::AssetUnavailable {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        EngineError::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether a job can continue after this error by dropping the offending asset
    pub fn is_recoverable(&self) -> bool {
        matches!(self, EngineError::AssetUnavailable { .. })
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
