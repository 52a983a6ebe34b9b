//! In-memory media backend for engine tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use async_trait::async_trait;
use tokio::sync::Semaphore;
use crate::backend::{MediaBackend, RenderPlan};
use crate::error::BackendError;
use crate::normalize::Canvas;

const DEFAULT_PROBE_SECS: f64 = 5.0;

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string()
}

/// Backend that writes placeholder files and records what it was asked to do
#[derive(Default)]
pub struct FakeBackend {
    durations: HashMap<String, f64>,
    failing_probes: HashSet<String>,
    failing_stills: HashSet<String>,
    failing_encodes: HashSet<String>,
    panicking_encodes: HashSet<String>,
    encode_gate: Option<Arc<Semaphore>>,
    encode_delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    still_calls: AtomicUsize,
    probe_calls: AtomicUsize,
    encodes: Mutex<Vec<(PathBuf, RenderPlan)>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `secs` when probing any file named `name`
    pub fn with_duration(mut self, name: &str, secs: f64) -> Self {
        self.durations.insert(name.to_string(), secs);
        self
    }

    pub fn failing_probe(mut self, name: &str) -> Self {
        self.failing_probes.insert(name.to_string());
        self
    }

    pub fn failing_still(mut self, name: &str) -> Self {
        self.failing_stills.insert(name.to_string());
        self
    }

    /// Fail encoding of the output file named `name` (e.g. `video_2.mp4`)
    pub fn failing_encode(mut self, name: &str) -> Self {
        self.failing_encodes.insert(name.to_string());
        self
    }

    /// Panic while encoding the output file named `name`
    pub fn panicking_encode(mut self, name: &str) -> Self {
        self.panicking_encodes.insert(name.to_string());
        self
    }

    /// Block every encode until a permit is added to the returned semaphore
    pub fn gated(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.encode_gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    /// Make every encode take at least `delay`
    pub fn with_encode_delay(mut self, delay: Duration) -> Self {
        self.encode_delay = Some(delay);
        self
    }

    /// Highest number of encodes observed running at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn still_calls(&self) -> usize {
        self.still_calls.load(Ordering::SeqCst)
    }

    pub fn probe_calls(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }

    pub fn encodes(&self) -> Vec<(PathBuf, RenderPlan)> {
        self.encodes.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaBackend for FakeBackend {
    async fn probe_duration(&self, path: &Path) -> Result<f64, BackendError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        let name = file_name(path);
        if self.failing_probes.contains(&name) {
            return Err(BackendError::Probe {
                path: path.to_path_buf(),
                reason: "unreadable container".to_string(),
            });
        }
        Ok(self.durations.get(&name).copied().unwrap_or(DEFAULT_PROBE_SECS))
    }

    async fn render_still(&self, source: &Path, _canvas: Canvas, dest: &Path) -> Result<(), BackendError> {
        self.still_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_stills.contains(&file_name(source)) {
            return Err(BackendError::Other(format!("cannot decode {}", source.display())));
        }
        tokio::fs::write(dest, b"frame")
            .await
            .map_err(|e| BackendError::Other(e.to_string()))
    }

    async fn encode(&self, plan: &RenderPlan, output: &Path) -> Result<(), BackendError> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        let result = self.encode_inner(plan, output).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl FakeBackend {
    async fn encode_inner(&self, plan: &RenderPlan, output: &Path) -> Result<(), BackendError> {
        if let Some(delay) = self.encode_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(gate) = &self.encode_gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| BackendError::Other(e.to_string()))?;
            permit.forget();
        }

        self.encodes
            .lock()
            .unwrap()
            .push((output.to_path_buf(), plan.clone()));

        if self.panicking_encodes.contains(&file_name(output)) {
            panic!("encoder crashed on {}", file_name(output));
        }
        if self.failing_encodes.contains(&file_name(output)) {
            return Err(BackendError::Failed {
                program: "fake".to_string(),
                code: 1,
                stderr: "muxer refused".to_string(),
            });
        }
        tokio::fs::write(output, b"mp4")
            .await
            .map_err(|e| BackendError::Other(e.to_string()))
    }
}
