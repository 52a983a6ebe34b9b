use std::path::{Path, PathBuf};
use std::process::Stdio;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use crate::assemble::{Timeline, Transition};
use crate::backend::{EncodingProfile, MediaBackend, RenderPlan};
use crate::config::MontageConfig;
use crate::error::BackendError;
use crate::ffprobe;
use crate::normalize::{Canvas, SegmentSource, VisualSegment};

/// FFmpeg version information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FFmpegVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl FFmpegVersion {
    /// The `xfade` filter first shipped in 4.3
    pub fn meets_requirement(&self) -> bool {
        (self.major, self.minor) >= (4, 3)
    }

    /// Parse version from the first line of `ffmpeg -version`
    /// Example: "ffmpeg version n6.1.1-static" -> FFmpegVersion { major: 6, minor: 1, patch: 1 }
    pub fn parse(version_str: &str) -> Result<Self> {
        let mut words = version_str.split_whitespace();
        let raw = match words.position(|w| w == "version") {
            Some(_) => words.next(),
            None => version_str
                .split_whitespace()
                .find(|s| s.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false)),
        }
        .ok_or_else(|| anyhow!("No version number found in: {}", version_str))?;

        // Static builds prefix the number with 'n', distro builds append a suffix ("4.4.2-0ubuntu0")
        let numeric: String = raw
            .strip_prefix('n')
            .unwrap_or(raw)
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();

        let mut parts = numeric.split('.').filter(|p| !p.is_empty());
        let major = parts
            .next()
            .ok_or_else(|| anyhow!("Invalid version format: {}", version_str))?
            .parse::<u32>()
            .with_context(|| format!("Failed to parse major version from: {}", raw))?;
        let minor = parts.next().map(str::parse::<u32>).transpose()
            .with_context(|| format!("Failed to parse minor version from: {}", raw))?
            .unwrap_or(0);
        let patch = parts.next().map(str::parse::<u32>).transpose()
            .with_context(|| format!("Failed to parse patch version from: {}", raw))?
            .unwrap_or(0);

        Ok(FFmpegVersion { major, minor, patch })
    }
}

/// Captured output of a finished ffmpeg run
#[derive(Debug, Clone)]
pub struct FFmpegOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Format seconds for ffmpeg time and filter arguments
fn secs(value: f64) -> String {
    format!("{:.3}", value)
}

/// Builds ffmpeg argument lists for still frames and final renders
#[derive(Debug, Clone, Default)]
pub struct CommandBuilder;

impl CommandBuilder {
    pub fn new() -> Self {
        CommandBuilder
    }

    /// Scale to the canvas height, then center-crop wide sources or pad narrow ones with black
    pub fn fit_filter(canvas: Canvas) -> String {
        let (w, h) = (canvas.width, canvas.height);
        format!("scale=-2:{h},crop='min(iw,{w})':{h},pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:black")
    }

    /// Decode one image, fit it to the canvas and write a single frame
    pub fn build_still_command(&self, source: &Path, canvas: Canvas, dest: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            source.to_string_lossy().to_string(),
            "-vf".to_string(),
            Self::fit_filter(canvas),
            "-frames:v".to_string(),
            "1".to_string(),
            dest.to_string_lossy().to_string(),
        ]
    }

    /// Build the full render: one input per segment, a concat or xfade graph,
    /// the closer concatenated after the body, and audio looped then trimmed
    pub fn build_render_command(&self, plan: &RenderPlan, output: &Path) -> Vec<String> {
        let timeline = &plan.timeline;
        let profile = &plan.profile;
        let total = plan.duration();

        let mut args = vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
        ];

        let segments = timeline
            .entries()
            .iter()
            .chain(timeline.closing())
            .map(|entry| &entry.segment);
        for segment in segments.clone() {
            match &segment.source {
                SegmentSource::Still(path) => {
                    args.push("-loop".to_string());
                    args.push("1".to_string());
                    args.push("-framerate".to_string());
                    args.push(profile.fps.to_string());
                    args.push("-t".to_string());
                    args.push(secs(segment.duration));
                    args.push("-i".to_string());
                    args.push(path.to_string_lossy().to_string());
                }
                SegmentSource::Clip(path) => {
                    args.push("-i".to_string());
                    args.push(path.to_string_lossy().to_string());
                }
            }
        }

        let audio_input = segments.clone().count();
        if let Some(audio) = &plan.audio {
            if audio.is_looped() {
                args.push("-stream_loop".to_string());
                args.push(audio.loops.to_string());
            }
            args.push("-i".to_string());
            args.push(audio.source.to_string_lossy().to_string());
        }

        let mut graph = Vec::new();
        for (i, segment) in segments.enumerate() {
            graph.push(Self::input_chain(i, segment, profile));
        }
        graph.extend(Self::join_chain(timeline));

        if let Some(audio) = &plan.audio {
            graph.push(format!(
                "[{}:a]atrim=0:{},asetpts=PTS-STARTPTS[aout]",
                audio_input,
                secs(audio.duration)
            ));
        }

        args.push("-filter_complex".to_string());
        args.push(graph.join(";"));
        args.push("-map".to_string());
        args.push("[vout]".to_string());
        if plan.audio.is_some() {
            args.push("-map".to_string());
            args.push("[aout]".to_string());
        }

        args.extend(Self::profile_args(profile, plan.audio.is_some()));
        args.push("-t".to_string());
        args.push(secs(total));
        args.push("-movflags".to_string());
        args.push("+faststart".to_string());
        args.push(output.to_string_lossy().to_string());

        args
    }

    /// Normalize one input to the profile frame rate and pixel format
    fn input_chain(index: usize, segment: &VisualSegment, profile: &EncodingProfile) -> String {
        let fit = match segment.source {
            // stills are already rendered at canvas size
            SegmentSource::Still(_) => String::new(),
            SegmentSource::Clip(_) => format!(
                "{},trim=duration={},",
                Self::fit_filter(segment.canvas),
                secs(segment.duration)
            ),
        };
        format!(
            "[{index}:v]{fit}setpts=PTS-STARTPTS,fps={},format={},setsar=1,settb=AVTB[v{index}]",
            profile.fps, profile.pixel_format
        )
    }

    /// Join main entries with concat or chained xfade, then hard-append the closer
    fn join_chain(timeline: &Timeline) -> Vec<String> {
        let entries = timeline.entries();
        let closing_label = entries.len();
        let body_label = if timeline.closing().is_some() { "body" } else { "vout" };
        let mut chain = Vec::new();

        match timeline.transition() {
            _ if entries.len() == 1 => {
                chain.push(format!("[v0]null[{body_label}]"));
            }
            Transition::Cut => {
                let inputs: String = (0..entries.len()).map(|i| format!("[v{i}]")).collect();
                chain.push(format!("{inputs}concat=n={}:v=1:a=0[{body_label}]", entries.len()));
            }
            Transition::Crossfade { fade } => {
                let mut previous = "v0".to_string();
                for (i, entry) in entries.iter().enumerate().skip(1) {
                    let label = if i == entries.len() - 1 {
                        body_label.to_string()
                    } else {
                        format!("x{i}")
                    };
                    // offset is measured on the already-joined stream, i.e. the entry start
                    chain.push(format!(
                        "[{previous}][v{i}]xfade=transition=fade:duration={}:offset={}[{label}]",
                        secs(entry.fade_in.unwrap_or(fade)),
                        secs(entry.start)
                    ));
                    previous = label;
                }
            }
        }

        if timeline.closing().is_some() {
            chain.push(format!("[body][v{closing_label}]concat=n=2:v=1:a=0[vout]"));
        }
        chain
    }

    /// Codec arguments of the fixed encoding profile
    pub fn profile_args(profile: &EncodingProfile, with_audio: bool) -> Vec<String> {
        let mut args = vec![
            "-c:v".to_string(),
            profile.video_codec.clone(),
            "-preset".to_string(),
            profile.preset.clone(),
            "-pix_fmt".to_string(),
            profile.pixel_format.clone(),
            "-r".to_string(),
            profile.fps.to_string(),
        ];
        if with_audio {
            args.push("-c:a".to_string());
            args.push(profile.audio_codec.clone());
        } else {
            args.push("-an".to_string());
        }
        args
    }
}

/// Media backend driving local ffmpeg and ffprobe binaries
pub struct FfmpegBackend {
    ffmpeg_bin: PathBuf,
    ffprobe_bin: PathBuf,
    timeout_secs: Option<u64>,
    version: Option<FFmpegVersion>,
    builder: CommandBuilder,
}

impl FfmpegBackend {
    /// Locate ffmpeg and check it supports crossfades
    pub async fn new(cfg: &MontageConfig) -> Result<Self> {
        let ffmpeg_bin = cfg.ffmpeg_bin.clone();
        let version = match Self::detect_version(&ffmpeg_bin).await? {
            Ok(version) => {
                if !version.meets_requirement() {
                    return Err(anyhow!(
                        "FFmpeg version {}.{}.{} does not meet requirement (>= 4.3). \
                         Please install FFmpeg 4.3 or later.",
                        version.major, version.minor, version.patch
                    ));
                }
                info!("🎬 Using FFmpeg {}.{}.{} at {}", version.major, version.minor, version.patch,
                      ffmpeg_bin.display());
                Some(version)
            }
            Err(e) => {
                // git snapshot builds report "N-xxxxx-g<hash>"
                warn!("Could not determine FFmpeg version ({}), assuming a recent build", e);
                None
            }
        };

        Ok(FfmpegBackend {
            ffmpeg_bin,
            ffprobe_bin: cfg.ffprobe_bin.clone(),
            timeout_secs: cfg.ffmpeg_timeout_secs,
            version,
            builder: CommandBuilder::new(),
        })
    }

    pub fn version(&self) -> Option<&FFmpegVersion> {
        self.version.as_ref()
    }

    /// Outer error: ffmpeg could not be run. Inner error: its banner was unparseable.
    async fn detect_version(ffmpeg_bin: &Path) -> Result<Result<FFmpegVersion>> {
        let output = Command::new(ffmpeg_bin)
            .arg("-version")
            .output()
            .await
            .with_context(|| format!("Failed to execute FFmpeg at: {}", ffmpeg_bin.display()))?;

        if !output.status.success() {
            return Err(anyhow!("FFmpeg version check failed"));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let first_line = stdout.lines().next()
            .ok_or_else(|| anyhow!("Empty output from FFmpeg -version"))?;

        Ok(FFmpegVersion::parse(first_line))
    }

    /// Run ffmpeg with `args`, killing it if it outlives the configured timeout
    pub async fn execute(&self, args: Vec<String>) -> Result<FFmpegOutput, BackendError> {
        let program = self.ffmpeg_bin.display().to_string();
        debug!("Executing FFmpeg: {} {}", program, args.join(" "));

        let mut child = Command::new(&self.ffmpeg_bin)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BackendError::Spawn { program: program.clone(), source })?;

        let stdout = child.stdout.take()
            .ok_or_else(|| BackendError::Other("Failed to capture FFmpeg stdout".to_string()))?;
        let stderr = child.stderr.take()
            .ok_or_else(|| BackendError::Other("Failed to capture FFmpeg stderr".to_string()))?;

        let stdout_handle = tokio::spawn(collect_lines(stdout));
        let stderr_handle = tokio::spawn(collect_lines(stderr));

        let status = match self.timeout_secs {
            Some(limit) => match timeout(Duration::from_secs(limit), child.wait()).await {
                Ok(result) => result,
                Err(_) => {
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill stuck FFmpeg process: {}", e);
                    }
                    return Err(BackendError::Timeout { program, secs: limit });
                }
            },
            None => child.wait().await,
        }
        .map_err(|e| BackendError::Other(format!("Failed to wait for FFmpeg process: {}", e)))?;

        let stdout = stdout_handle.await.unwrap_or_default();
        let stderr = stderr_handle.await.unwrap_or_default();

        if !status.success() {
            return Err(BackendError::Failed {
                program,
                code: status.code().unwrap_or(-1),
                stderr,
            });
        }

        Ok(FFmpegOutput {
            exit_code: status.code(),
            stdout,
            stderr,
        })
    }
}

async fn collect_lines<R>(stream: R) -> String
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = Vec::new();
    let mut line_stream = BufReader::new(stream).lines();
    while let Ok(Some(line)) = line_stream.next_line().await {
        lines.push(line);
    }
    lines.join("\n")
}

#[async_trait]
impl MediaBackend for FfmpegBackend {
    async fn probe_duration(&self, path: &Path) -> Result<f64, BackendError> {
        ffprobe::probe_duration(&self.ffprobe_bin, path).await
    }

    async fn render_still(&self, source: &Path, canvas: Canvas, dest: &Path) -> Result<(), BackendError> {
        let args = self.builder.build_still_command(source, canvas, dest);
        self.execute(args).await.map(|_| ())
    }

    async fn encode(&self, plan: &RenderPlan, output: &Path) -> Result<(), BackendError> {
        let args = self.builder.build_render_command(plan, output);
        self.execute(args).await?;
        info!("FFmpeg wrote {} ({:.1}s)", output.display(), plan.duration());
        Ok(())
    }
}
