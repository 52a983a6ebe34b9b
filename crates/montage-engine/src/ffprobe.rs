use std::path::Path;
use log::debug;
use serde::Deserialize;
use tokio::process::Command;
use crate::error::BackendError;

/// Subset of `ffprobe -show_format -show_streams` JSON the engine reads
#[derive(Debug, Clone, Deserialize)]
pub struct FFProbeData {
    #[serde(default)]
    pub streams: Vec<FFProbeStream>,
    pub format: FFProbeFormat,
}

/// Format-level metadata from ffprobe
#[derive(Debug, Clone, Deserialize)]
pub struct FFProbeFormat {
    pub format_name: Option<String>,
    /// Seconds, as ffprobe prints them ("12.480000")
    pub duration: Option<String>,
}

/// Stream-level metadata from ffprobe
#[derive(Debug, Clone, Deserialize)]
pub struct FFProbeStream {
    pub index: i32,
    pub codec_type: Option<String>,
    pub codec_name: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub duration: Option<String>,
}

impl FFProbeData {
    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Container duration, falling back to the longest stream for formats
    /// that do not report one (raw streams, some webm)
    pub fn duration_secs(&self) -> Option<f64> {
        let container = self
            .format
            .duration
            .as_deref()
            .and_then(|d| d.trim().parse::<f64>().ok())
            .filter(|d| d.is_finite());
        if container.is_some() {
            return container;
        }

        self.streams
            .iter()
            .filter_map(|s| s.duration.as_deref()?.trim().parse::<f64>().ok())
            .filter(|d| d.is_finite())
            .reduce(f64::max)
    }

    pub fn has_video(&self) -> bool {
        self.streams.iter().any(|s| s.codec_type.as_deref() == Some("video"))
    }
}

/// Run ffprobe on `file_path` and parse its JSON output
pub async fn probe_file(ffprobe_bin: &Path, file_path: &Path) -> Result<FFProbeData, BackendError> {
    let program = ffprobe_bin.display().to_string();
    debug!("ffprobe: probing {}", file_path.display());

    let output = Command::new(ffprobe_bin)
        .arg("-v")
        .arg("error")
        .arg("-print_format")
        .arg("json")
        .arg("-show_streams")
        .arg("-show_format")
        .arg(file_path)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| BackendError::Spawn { program: program.clone(), source })?;

    if !output.status.success() {
        return Err(BackendError::Failed {
            program,
            code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let json = String::from_utf8_lossy(&output.stdout);
    FFProbeData::parse(&json).map_err(|e| BackendError::Probe {
        path: file_path.to_path_buf(),
        reason: format!("unparseable ffprobe output: {}", e),
    })
}

/// Probe and return the duration in seconds
pub async fn probe_duration(ffprobe_bin: &Path, file_path: &Path) -> Result<f64, BackendError> {
    let data = probe_file(ffprobe_bin, file_path).await?;
    data.duration_secs().ok_or_else(|| BackendError::Probe {
        path: file_path.to_path_buf(),
        reason: "no duration reported".to_string(),
    })
}
