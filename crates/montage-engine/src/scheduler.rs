use std::sync::Arc;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use crate::job::{CompilationJob, JobOutcome, JobStage};

/// Jobs allowed to run at once when nothing else is configured
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Progress signal delivered to the caller of [`Scheduler::dispatch`]
///
/// Every job that starts produces exactly one `Outcome` followed by exactly one
/// `Completed`. Jobs that never start (cancelled while queued) produce nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Started { index: usize },
    Stage { index: usize, stage: JobStage },
    Outcome(JobOutcome),
    Completed { index: usize },
}

/// Bounded worker pool for compilation jobs
#[derive(Debug, Clone)]
pub struct Scheduler {
    concurrency: usize,
}

impl Default for Scheduler {
    fn default() -> Self {
        Scheduler::new(DEFAULT_CONCURRENCY)
    }
}

impl Scheduler {
    pub fn new(concurrency: usize) -> Self {
        Scheduler {
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Queue `jobs` in order and start them as workers free up
    ///
    /// Must be called from within a tokio runtime.
    pub fn dispatch(&self, jobs: Vec<CompilationJob>) -> BatchHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let dispatched = jobs.len();

        info!("Dispatching {} job(s) with {} worker(s)", dispatched, self.concurrency);

        let token = cancel.clone();
        let dispatcher = tokio::spawn(async move {
            let mut started = 0usize;

            for job in jobs {
                let permit = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    permit = Arc::clone(&permits).acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                };
                if token.is_cancelled() {
                    break;
                }

                let index = job.index();
                started += 1;
                debug!("Starting video {}", index);
                let _ = tx.send(JobEvent::Started { index });

                let tx = tx.clone();
                tokio::spawn(async move {
                    let events = tx.clone();
                    // run in its own task so a panicking job still reports and completes
                    let outcome = match tokio::spawn(async move { job.run(&events).await }).await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            let reason = format!("Error in video {}: worker aborted: {}", index, e);
                            warn!("❌ {}", reason);
                            JobOutcome::Failed { index, reason }
                        }
                    };
                    let _ = tx.send(JobEvent::Outcome(outcome));
                    let _ = tx.send(JobEvent::Completed { index });
                    drop(permit);
                });
            }

            if started < dispatched {
                info!("Export cancelled: {} queued job(s) will not start", dispatched - started);
            }
            started
        });

        BatchHandle {
            events: rx,
            cancel,
            dispatcher,
            report: BatchReport::new(dispatched, Utc::now()),
        }
    }
}

/// Caller's end of a dispatched batch
pub struct BatchHandle {
    events: UnboundedReceiver<JobEvent>,
    cancel: CancellationToken,
    dispatcher: JoinHandle<usize>,
    /// Every event handed out so far, whichever way it was received
    report: BatchReport,
}

impl BatchHandle {
    pub fn dispatched(&self) -> usize {
        self.report.dispatched
    }

    /// Stop queued jobs from starting; running jobs finish and still report
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this batch, for wiring to signal handlers
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Next event, or `None` once every started job has completed
    pub async fn next_event(&mut self) -> Option<JobEvent> {
        let event = self.events.recv().await?;
        self.report.record(event.clone());
        Some(event)
    }

    /// Drain all events into a report
    pub async fn wait(self) -> BatchReport {
        self.wait_with(|_| {}).await
    }

    /// Drain all events into a report, passing each one to `on_event` first
    pub async fn wait_with(mut self, mut on_event: impl FnMut(&JobEvent)) -> BatchReport {
        let mut report = self.report;

        while let Some(event) = self.events.recv().await {
            on_event(&event);
            report.record(event);
        }

        match self.dispatcher.await {
            Ok(started) => {
                debug!("Dispatcher finished after starting {} job(s)", started);
                if started != report.started {
                    warn!("Dispatcher started {} job(s) but {} start event(s) were seen", started, report.started);
                    report.started = started;
                }
            }
            Err(e) => warn!("Dispatcher task ended abnormally: {}", e),
        }

        report.finished_at = Utc::now();
        report.outcomes.sort_by_key(JobOutcome::index);
        report
    }
}

/// Aggregate of one batch's events
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub dispatched: usize,
    pub started: usize,
    pub completed: usize,
    /// One entry per completed job, ordered by index
    pub outcomes: Vec<JobOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchReport {
    fn new(dispatched: usize, started_at: DateTime<Utc>) -> Self {
        BatchReport {
            dispatched,
            started: 0,
            completed: 0,
            outcomes: Vec::new(),
            started_at,
            finished_at: started_at,
        }
    }

    fn record(&mut self, event: JobEvent) {
        match event {
            JobEvent::Started { .. } => self.started += 1,
            JobEvent::Stage { .. } => {}
            JobEvent::Outcome(outcome) => self.outcomes.push(outcome),
            JobEvent::Completed { .. } => self.completed += 1,
        }
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &JobOutcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &JobOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    /// Jobs that were queued but never started
    pub fn cancelled(&self) -> usize {
        self.dispatched - self.started
    }

    /// Every job that started has also completed; cancelled jobs do not count
    pub fn is_complete(&self) -> bool {
        self.completed == self.started
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}
