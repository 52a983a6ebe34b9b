use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc::UnboundedSender;
use crate::assemble::assemble;
use crate::asset::SourceAsset;
use crate::audio;
use crate::backend::{EncodingProfile, MediaBackend, RenderPlan};
use crate::config::ExportParameters;
use crate::error::{EngineError, EngineResult};
use crate::normalize::{AssetNormalizer, Canvas, VisualSegment};
use crate::scheduler::JobEvent;

/// Pipeline position of a compilation job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    Selecting,
    Normalizing,
    Assembling,
    AudioFitting,
    Rendering,
    Done,
    Failed,
}

impl JobStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStage::Done | JobStage::Failed)
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStage::Selecting => "selecting",
            JobStage::Normalizing => "normalizing",
            JobStage::Assembling => "assembling",
            JobStage::AudioFitting => "fitting audio",
            JobStage::Rendering => "rendering",
            JobStage::Done => "done",
            JobStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Final result of one job, reported exactly once
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Succeeded { index: usize, output: PathBuf },
    Failed { index: usize, reason: String },
}

impl JobOutcome {
    pub fn index(&self) -> usize {
        match self {
            JobOutcome::Succeeded { index, .. } | JobOutcome::Failed { index, .. } => *index,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded { .. })
    }
}

/// Output file name for the 1-based job `index`
pub fn output_file_name(index: usize) -> String {
    format!("video_{}.mp4", index)
}

/// Draw `count` entries from `pool`
///
/// Without replacement when the pool is large enough, with replacement otherwise.
pub fn select_sources<R: Rng + ?Sized>(pool: &[String], count: usize, rng: &mut R) -> Vec<String> {
    if pool.is_empty() || count == 0 {
        return Vec::new();
    }

    if pool.len() < count {
        (0..count)
            .filter_map(|_| pool.choose(&mut *rng).cloned())
            .collect()
    } else {
        pool.choose_multiple(rng, count).cloned().collect()
    }
}

/// Collaborators shared read-only by every job of a batch
pub struct JobContext {
    pub backend: Arc<dyn MediaBackend>,
    pub normalizer: AssetNormalizer,
    pub base_dir: PathBuf,
    pub profile: EncodingProfile,
}

/// Unit of work producing `video_{index}.mp4`
pub struct CompilationJob {
    index: usize,
    pool: Arc<[String]>,
    params: Arc<ExportParameters>,
    ctx: Arc<JobContext>,
    seed: Option<u64>,
}

impl CompilationJob {
    pub fn new(
        index: usize,
        pool: Arc<[String]>,
        params: Arc<ExportParameters>,
        ctx: Arc<JobContext>,
        seed: Option<u64>,
    ) -> Self {
        CompilationJob { index, pool, params, ctx, seed }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn output_path(&self) -> PathBuf {
        self.params.output_dir.join(output_file_name(self.index))
    }

    /// Run the job to a terminal state, emitting stage events along the way
    pub async fn run(&self, events: &UnboundedSender<JobEvent>) -> JobOutcome {
        match self.compile(events).await {
            Ok(output) => {
                self.stage(events, JobStage::Done);
                info!("✅ Video {} written to {}", self.index, output.display());
                JobOutcome::Succeeded { index: self.index, output }
            }
            Err(e) => {
                self.stage(events, JobStage::Failed);
                let reason = format!("Error in video {}: {}", self.index, e);
                warn!("❌ {}", reason);
                JobOutcome::Failed { index: self.index, reason }
            }
        }
    }

    fn stage(&self, events: &UnboundedSender<JobEvent>, stage: JobStage) {
        debug!("Video {}: {}", self.index, stage);
        // the receiver may be gone if the caller stopped listening
        let _ = events.send(JobEvent::Stage { index: self.index, stage });
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(self.index as u64)),
            None => StdRng::from_rng(&mut rand::rng()),
        }
    }

    async fn compile(&self, events: &UnboundedSender<JobEvent>) -> EngineResult<PathBuf> {
        let params = &self.params;
        let canvas = params.canvas();

        self.stage(events, JobStage::Selecting);
        let selected = select_sources(&self.pool, params.images_per_video, &mut self.rng());
        debug!("Video {}: selected {:?}", self.index, selected);

        self.stage(events, JobStage::Normalizing);
        let mut segments: Vec<VisualSegment> = Vec::with_capacity(selected.len());
        for entry in &selected {
            let normalized = match SourceAsset::resolve(entry, &self.ctx.base_dir) {
                Ok(asset) => self.ctx.normalizer.normalize(&asset, canvas, params.per_image_secs).await,
                Err(e) => Err(e),
            };
            match normalized {
                Ok(segment) => segments.push(segment),
                Err(e) if e.is_recoverable() => {
                    warn!("Video {}: skipping source: {}", self.index, e);
                }
                Err(e) => return Err(e),
            }
        }

        if segments.is_empty() {
            return Err(EngineError::NoUsableAssets { selected: selected.len() });
        }

        let closing = match params.closing_image.as_deref() {
            Some(path) => self.closing_segment(path, canvas).await?,
            None => None,
        };

        self.stage(events, JobStage::Assembling);
        let timeline = assemble(segments, closing, params.crossfade, params.fade_secs)?;

        self.stage(events, JobStage::AudioFitting);
        let audio = audio::fit(self.ctx.backend.as_ref(), params.audio.as_deref(), timeline.duration()).await?;

        self.stage(events, JobStage::Rendering);
        let output = self.output_path();
        let plan = RenderPlan {
            timeline,
            audio,
            profile: self.ctx.profile.clone(),
        };
        info!("🎬 Rendering video {} ({:.1}s, {} segment(s), audio: {})",
              self.index,
              plan.duration(),
              plan.timeline.entries().len(),
              if plan.audio.is_some() { "yes" } else { "no" });

        self.ctx
            .backend
            .encode(&plan, &output)
            .await
            .map_err(EngineError::EncodeFailure)?;

        Ok(output)
    }

    async fn closing_segment(
        &self,
        path: &Path,
        canvas: Canvas,
    ) -> EngineResult<Option<VisualSegment>> {
        if path.as_os_str().is_empty() {
            return Ok(None);
        }

        let segment = match SourceAsset::resolve(path, &self.ctx.base_dir) {
            Ok(asset) => self.ctx.normalizer.normalize_closing(&asset, canvas).await,
            Err(e) => Err(e),
        };
        match segment {
            Ok(segment) => Ok(Some(segment)),
            Err(e) if e.is_recoverable() => {
                warn!("Video {}: closing image skipped: {}", self.index, e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FrameCache;
    use crate::normalize::{SegmentSource, CLOSING_DURATION_SECS};
    use crate::testing::FakeBackend;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use tokio::sync::mpsc;

    fn pool(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    struct Fixture {
        dir: tempfile::TempDir,
        backend: Arc<FakeBackend>,
        ctx: Arc<JobContext>,
    }

    fn fixture(backend: FakeBackend, files: &[&str]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        for name in files {
            std::fs::write(dir.path().join(name), b"data").unwrap();
        }
        std::fs::create_dir(dir.path().join("out")).unwrap();

        let backend = Arc::new(backend);
        let cache = Arc::new(FrameCache::new(dir.path().join("cache")).unwrap());
        let ctx = Arc::new(JobContext {
            backend: backend.clone(),
            normalizer: AssetNormalizer::new(backend.clone(), cache),
            base_dir: dir.path().to_path_buf(),
            profile: EncodingProfile::default(),
        });
        Fixture { dir, backend, ctx }
    }

    fn params(fx: &Fixture, images: usize) -> ExportParameters {
        ExportParameters {
            images_per_video: images,
            output_videos: 1,
            width: 640,
            height: 360,
            per_image_secs: 2.0,
            fade_secs: 0.5,
            audio: None,
            output_dir: fx.dir.path().join("out"),
            crossfade: true,
            closing_image: None,
        }
    }

    fn job(fx: &Fixture, entries: &[&str], params: ExportParameters) -> CompilationJob {
        CompilationJob::new(
            1,
            pool(entries).into(),
            Arc::new(params),
            Arc::clone(&fx.ctx),
            Some(7),
        )
    }

    #[test]
    fn test_selection_without_replacement_has_no_duplicates() {
        let pool = pool(&["a", "b", "c", "d", "e"]);
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..50 {
            let picked = select_sources(&pool, 5, &mut rng);
            let unique: HashSet<_> = picked.iter().collect();
            assert_eq!(picked.len(), 5);
            assert_eq!(unique.len(), 5);
        }
    }

    #[test]
    fn test_selection_with_small_pool_repeats() {
        let pool = pool(&["a", "b"]);
        let mut rng = StdRng::seed_from_u64(3);
        let picked = select_sources(&pool, 6, &mut rng);
        assert_eq!(picked.len(), 6);
        let unique: HashSet<_> = picked.iter().collect();
        assert!(unique.len() <= 2);
    }

    #[test]
    fn test_selection_from_empty_pool() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(select_sources(&[], 3, &mut rng).is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_selection_size_and_membership(
            pool_size in 1usize..20,
            count in 1usize..30,
            seed in any::<u64>(),
        ) {
            let pool: Vec<String> = (0..pool_size).map(|i| format!("f{}.jpg", i)).collect();
            let mut rng = StdRng::seed_from_u64(seed);
            let picked = select_sources(&pool, count, &mut rng);

            prop_assert_eq!(picked.len(), count);
            prop_assert!(picked.iter().all(|p| pool.contains(p)));
            if pool_size >= count {
                let unique: HashSet<_> = picked.iter().collect();
                prop_assert_eq!(unique.len(), count);
            }
        }
    }

    #[test]
    fn test_output_file_name_is_one_based_index() {
        assert_eq!(output_file_name(1), "video_1.mp4");
        assert_eq!(output_file_name(12), "video_12.mp4");
    }

    #[tokio::test]
    async fn test_job_renders_and_reports_stages() {
        let fx = fixture(FakeBackend::new(), &["a.jpg", "b.jpg", "c.jpg"]);
        let job = job(&fx, &["a.jpg", "b.jpg", "c.jpg"], params(&fx, 3));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = job.run(&tx).await;
        drop(tx);

        let expected = fx.dir.path().join("out").join("video_1.mp4");
        assert_eq!(outcome, JobOutcome::Succeeded { index: 1, output: expected.clone() });
        assert!(expected.is_file());

        let mut stages = Vec::new();
        while let Some(event) = rx.recv().await {
            if let JobEvent::Stage { stage, .. } = event {
                stages.push(stage);
            }
        }
        assert_eq!(
            stages,
            vec![
                JobStage::Selecting,
                JobStage::Normalizing,
                JobStage::Assembling,
                JobStage::AudioFitting,
                JobStage::Rendering,
                JobStage::Done,
            ]
        );
        let (last, before) = stages.split_last().unwrap();
        assert!(last.is_terminal());
        assert!(before.iter().all(|s| !s.is_terminal()));

        let encodes = fx.backend.encodes();
        assert_eq!(encodes.len(), 1);
        let plan = &encodes[0].1;
        assert_eq!(plan.timeline.entries().len(), 3);
        assert!((plan.duration() - 5.0).abs() < 1e-9);
        assert!(plan.audio.is_none());
        assert_eq!(plan.profile.fps, 30);
    }

    #[tokio::test]
    async fn test_missing_source_is_skipped() {
        let fx = fixture(FakeBackend::new(), &["a.jpg", "b.jpg"]);
        let job = job(&fx, &["a.jpg", "b.jpg", "gone.jpg"], params(&fx, 3));
        let (tx, _rx) = mpsc::unbounded_channel();

        let outcome = job.run(&tx).await;

        assert!(outcome.is_success());
        let plan = &fx.backend.encodes()[0].1;
        assert_eq!(plan.timeline.entries().len(), 2);
    }

    #[tokio::test]
    async fn test_all_sources_missing_fails() {
        let fx = fixture(FakeBackend::new(), &[]);
        let job = job(&fx, &["x.jpg", "y.jpg"], params(&fx, 2));
        let (tx, _rx) = mpsc::unbounded_channel();

        match job.run(&tx).await {
            JobOutcome::Failed { index, reason } => {
                assert_eq!(index, 1);
                assert!(reason.starts_with("Error in video 1:"));
                assert!(reason.contains("no usable assets"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(fx.backend.encodes().is_empty());
    }

    #[tokio::test]
    async fn test_closing_and_audio_are_attached() {
        let fx = fixture(
            FakeBackend::new().with_duration("song.mp3", 4.0),
            &["a.jpg", "end.png", "song.mp3"],
        );
        let mut p = params(&fx, 1);
        p.closing_image = Some(PathBuf::from("end.png"));
        p.audio = Some(fx.dir.path().join("song.mp3"));
        let job = job(&fx, &["a.jpg"], p);
        let (tx, _rx) = mpsc::unbounded_channel();

        assert!(job.run(&tx).await.is_success());

        let plan = &fx.backend.encodes()[0].1;
        let closing = plan.timeline.closing().unwrap();
        assert_eq!(closing.segment.duration, CLOSING_DURATION_SECS);
        assert!(matches!(closing.segment.source, SegmentSource::Still(_)));
        let audio = plan.audio.as_ref().unwrap();
        assert!((audio.duration - 5.0).abs() < 1e-9);
        assert_eq!(audio.loops, 1);
        assert_eq!(plan.timeline.canvas(), Canvas::new(640, 360));
    }

    #[tokio::test]
    async fn test_missing_closing_image_is_ignored() {
        let fx = fixture(FakeBackend::new(), &["a.jpg"]);
        let mut p = params(&fx, 1);
        p.closing_image = Some(PathBuf::from("nowhere.png"));
        let job = job(&fx, &["a.jpg"], p);
        let (tx, _rx) = mpsc::unbounded_channel();

        assert!(job.run(&tx).await.is_success());
        assert!(fx.backend.encodes()[0].1.timeline.closing().is_none());
    }

    #[tokio::test]
    async fn test_encode_failure_carries_backend_message() {
        let fx = fixture(FakeBackend::new().failing_encode("video_1.mp4"), &["a.jpg"]);
        let job = job(&fx, &["a.jpg"], params(&fx, 1));
        let (tx, _rx) = mpsc::unbounded_channel();

        match job.run(&tx).await {
            JobOutcome::Failed { reason, .. } => assert!(reason.contains("muxer refused")),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_frame_failure_is_job_fatal() {
        let fx = fixture(FakeBackend::new().failing_still("a.jpg"), &["a.jpg", "b.jpg"]);
        let job = job(&fx, &["a.jpg", "b.jpg"], params(&fx, 2));
        let (tx, _rx) = mpsc::unbounded_channel();

        let outcome = job.run(&tx).await;
        assert!(!outcome.is_success());
        assert!(fx.backend.encodes().is_empty());
        assert!(JobStage::Failed.is_terminal());
    }
}
