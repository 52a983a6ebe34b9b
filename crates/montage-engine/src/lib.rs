pub mod config;
pub mod error;
pub mod asset;
pub mod cache;
pub mod normalize;
pub mod assemble;
pub mod audio;
pub mod backend;
pub mod job;
pub mod scheduler;
pub mod engine;
pub mod ffprobe;
pub mod ffmpeg;
pub mod catalog;
pub mod preset;

#[cfg(test)]
mod testing;

pub use config::{ExportParameters, MontageConfig};
pub use error::{BackendError, EngineError, EngineResult};
pub use cache::FrameCache;
pub use normalize::{Canvas, VisualSegment};
pub use assemble::{assemble, Timeline};
pub use audio::AudioTrack;
pub use backend::{EncodingProfile, MediaBackend, RenderPlan};
pub use job::{CompilationJob, JobOutcome, JobStage};
pub use scheduler::{BatchHandle, BatchReport, JobEvent, Scheduler};
pub use engine::{Engine, EngineOptions};
pub use ffmpeg::FfmpegBackend;
pub use catalog::Catalog;
pub use preset::OutputPreset;
