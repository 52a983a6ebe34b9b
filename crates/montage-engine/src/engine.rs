use std::path::PathBuf;
use std::sync::Arc;
use log::info;
use crate::backend::{EncodingProfile, MediaBackend};
use crate::cache::{CacheStats, FrameCache};
use crate::config::{ExportParameters, MontageConfig};
use crate::error::EngineResult;
use crate::job::{CompilationJob, JobContext};
use crate::normalize::AssetNormalizer;
use crate::scheduler::{BatchHandle, Scheduler};

/// Settings the engine needs beyond a batch's export parameters
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub concurrency: usize,
    pub cache_dir: PathBuf,
    pub base_dir: PathBuf,
    pub seed: Option<u64>,
}

impl EngineOptions {
    /// Build options from config, resolving relative catalog entries against `base_dir`
    pub fn from_config(cfg: &MontageConfig, base_dir: PathBuf) -> Self {
        EngineOptions {
            concurrency: cfg.concurrency,
            cache_dir: cfg.cache_dir.clone(),
            base_dir,
            seed: cfg.seed,
        }
    }
}

/// Turns a category's file list and export parameters into a dispatched batch
pub struct Engine {
    ctx: Arc<JobContext>,
    cache: Arc<FrameCache>,
    scheduler: Scheduler,
    seed: Option<u64>,
}

impl Engine {
    pub fn new(backend: Arc<dyn MediaBackend>, options: EngineOptions) -> EngineResult<Self> {
        let cache = Arc::new(FrameCache::new(&options.cache_dir)?);
        let ctx = Arc::new(JobContext {
            normalizer: AssetNormalizer::new(Arc::clone(&backend), Arc::clone(&cache)),
            backend,
            base_dir: options.base_dir,
            profile: EncodingProfile::default(),
        });

        Ok(Engine {
            ctx,
            cache,
            scheduler: Scheduler::new(options.concurrency),
            seed: options.seed,
        })
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// One job per output video, indexed from 1
    pub fn jobs(&self, pool: Vec<String>, params: ExportParameters) -> Vec<CompilationJob> {
        let pool: Arc<[String]> = pool.into();
        let params = Arc::new(params);

        (1..=params.output_videos)
            .map(|index| {
                CompilationJob::new(
                    index,
                    Arc::clone(&pool),
                    Arc::clone(&params),
                    Arc::clone(&self.ctx),
                    self.seed,
                )
            })
            .collect()
    }

    /// Build the batch's jobs and dispatch them to the worker pool
    pub fn start(&self, pool: Vec<String>, params: ExportParameters) -> BatchHandle {
        info!("🚀 Exporting {} video(s) of {} source(s) each at {} from a pool of {}",
              params.output_videos, params.images_per_video, params.canvas(), pool.len());
        let jobs = self.jobs(pool, params);
        self.scheduler.dispatch(jobs)
    }
}
