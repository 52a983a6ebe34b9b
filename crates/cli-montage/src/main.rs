use anyhow::{bail, Context, Result};
use clap::Parser;
use humansize::{format_size, DECIMAL};
use log::{debug, error, info, warn, LevelFilter};
use montage_engine::{
    Catalog, Engine, EngineOptions, FfmpegBackend, JobEvent, JobOutcome, MontageConfig, OutputPreset,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Batch video compilation from a categorized media catalog
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (JSON or TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// CSV catalog with 'Category' and 'File' columns
    #[arg(long)]
    csv: PathBuf,

    /// Category whose files are compiled
    #[arg(long)]
    category: Option<String>,

    /// Print the catalog's categories and exit
    #[arg(long)]
    list_categories: bool,

    /// Named output ratio, e.g. "instagram-reel" or "youtube-video"
    #[arg(long)]
    preset: Option<String>,

    /// Sources per video
    #[arg(long)]
    images: Option<usize>,

    /// Number of videos to render
    #[arg(long)]
    videos: Option<usize>,

    /// Seconds each image is shown
    #[arg(long)]
    per_image_time: Option<f64>,

    /// Crossfade duration in seconds
    #[arg(long)]
    fade: Option<f64>,

    /// Join sources with hard cuts instead of crossfades
    #[arg(long)]
    no_crossfade: bool,

    /// Background audio file
    #[arg(long)]
    audio: Option<PathBuf>,

    /// Still shown for three seconds at the end of every video
    #[arg(long)]
    closing_image: Option<PathBuf>,

    /// Output folder for video_N.mp4 files
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Videos rendered at the same time
    #[arg(long)]
    concurrency: Option<usize>,

    /// Seed for reproducible source selection
    #[arg(long)]
    seed: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins unless --verbose is given
    let mut logger = env_logger::Builder::from_default_env();
    if args.verbose {
        logger.filter_level(LevelFilter::Debug);
    }
    logger.format_timestamp_secs().init();

    let mut cfg = MontageConfig::load_config(args.config.as_deref())
        .context("Failed to load configuration")?;

    let catalog = Catalog::from_path(&args.csv)
        .context("Failed to load catalog")?;
    let categories = catalog.categories();

    if args.list_categories {
        for category in &categories {
            println!("{} ({} files)", category, catalog.files_for(category).len());
        }
        return Ok(());
    }

    let Some(category) = args.category.as_deref() else {
        bail!("Please select a category. Available: {}", categories.join(", "));
    };
    let pool = catalog.files_for(category);
    if pool.is_empty() {
        bail!("No files found for category '{}'. Available: {}", category, categories.join(", "));
    }

    apply_overrides(&mut cfg, &args);
    cfg.export.validate().context("Invalid export parameters")?;

    let base_dir = resolve_base_dir(&cfg, &args.csv)?;

    info!("Montage starting");
    info!("Configuration loaded:");
    info!("  Catalog: {} ({} categories)", args.csv.display(), categories.len());
    info!("  Category: {} ({} files)", category, pool.len());
    info!("  Base dir: {}", base_dir.display());
    info!("  Canvas: {}", cfg.export.canvas());
    info!("  Per image: {}s, fade: {}s, crossfade: {}",
          cfg.export.per_image_secs, cfg.export.fade_secs, cfg.export.crossfade);
    info!("  Output: {}", cfg.export.output_dir.display());
    info!("  Concurrency: {}", cfg.concurrency);
    debug!("  Cache dir: {}", cfg.cache_dir.display());

    let backend = FfmpegBackend::new(&cfg).await
        .context("Failed to initialize FFmpeg backend")?;
    let ffmpeg_version = backend
        .version()
        .map(|v| format!("{}.{}.{}", v.major, v.minor, v.patch))
        .unwrap_or_else(|| "unknown".to_string());
    let engine = Engine::new(Arc::new(backend), EngineOptions::from_config(&cfg, base_dir))
        .context("Failed to initialize engine")?;

    let batch = engine.start(pool, cfg.export.clone());
    let total = batch.dispatched();

    let cancel = batch.cancel_token();
    let ctrl_c = tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                match result {
                    Ok(()) => {
                        warn!("🛑 Interrupted: no new videos will be started, waiting for running ones");
                        cancel.cancel();
                    }
                    Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
                }
            }
            _ = cancel.cancelled() => {}
        }
    });

    let mut done = 0usize;
    let report = batch.wait_with(|event| match event {
        JobEvent::Started { index } => info!("Video {}: ▶️  started", index),
        JobEvent::Stage { index, stage } => debug!("Video {}: {}", index, stage),
        JobEvent::Outcome(JobOutcome::Succeeded { index, output }) => {
            info!("Video {}: ✅ wrote {}", index, output.display())
        }
        JobEvent::Outcome(JobOutcome::Failed { reason, .. }) => error!("❌ {}", reason),
        JobEvent::Completed { .. } => {
            done += 1;
            info!("Progress: {}/{} videos done", done, total);
        }
    }).await;
    ctrl_c.abort();

    let written: u64 = report
        .succeeded()
        .filter_map(|outcome| match outcome {
            JobOutcome::Succeeded { output, .. } => std::fs::metadata(output).ok(),
            JobOutcome::Failed { .. } => None,
        })
        .map(|meta| meta.len())
        .sum();
    let failed = report.failed().count();
    let stats = engine.cache_stats();

    info!("📊 Batch summary:");
    info!("  Succeeded: {}/{}", report.succeeded().count(), report.dispatched);
    info!("  Failed: {}", failed);
    if report.cancelled() > 0 {
        info!("  Cancelled before start: {}", report.cancelled());
    }
    info!("  Written: {}", format_size(written, DECIMAL));
    info!("  Frame cache: {} hit(s), {} miss(es)", stats.hits, stats.misses);
    info!("  Elapsed: {}", format_duration(report.elapsed()));
    info!("  FFmpeg: {}", ffmpeg_version);

    if failed > 0 {
        bail!("{} of {} video(s) failed", failed, report.dispatched);
    }
    Ok(())
}

/// Layer command-line flags over the loaded configuration
fn apply_overrides(cfg: &mut MontageConfig, args: &Args) {
    if let Some(preset) = args.preset.clone() {
        cfg.preset = Some(preset);
    }
    if let Some(name) = cfg.preset.as_deref() {
        if OutputPreset::from_name(name).is_none() {
            warn!("Unknown output preset '{}', using {}", name, OutputPreset::FALLBACK);
        }
        let canvas = OutputPreset::resolve(Some(name));
        cfg.export.width = canvas.width;
        cfg.export.height = canvas.height;
    }

    let export = &mut cfg.export;
    if let Some(n) = args.images {
        export.images_per_video = n;
    }
    if let Some(n) = args.videos {
        export.output_videos = n;
    }
    if let Some(secs) = args.per_image_time {
        export.per_image_secs = secs;
    }
    if let Some(secs) = args.fade {
        export.fade_secs = secs;
    }
    if args.no_crossfade {
        export.crossfade = false;
    }
    if args.audio.is_some() {
        export.audio = args.audio.clone();
    }
    if args.closing_image.is_some() {
        export.closing_image = args.closing_image.clone();
    }
    if let Some(dir) = &args.output {
        export.output_dir = dir.clone();
    }

    if let Some(n) = args.concurrency {
        cfg.concurrency = n;
    }
    if args.seed.is_some() {
        cfg.seed = args.seed;
    }
}

/// Configured base dir, else the catalog's directory, else the working directory
fn resolve_base_dir(cfg: &MontageConfig, csv: &Path) -> Result<PathBuf> {
    if let Some(dir) = &cfg.base_dir {
        return Ok(dir.clone());
    }
    match csv.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => Ok(parent.to_path_buf()),
        _ => std::env::current_dir().context("Failed to determine working directory"),
    }
}

/// Helper function to format duration for logging
fn format_duration(d: chrono::Duration) -> String {
    let minutes = d.num_minutes();
    let seconds = d.num_seconds() % 60;
    let millis = d.num_milliseconds() % 1000;
    format!("{}m {}.{:03}s", minutes, seconds, millis)
}
