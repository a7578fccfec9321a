//! Worker pool and run lifecycle.
//!
//! A [`LoadDriver`] owns a validated scenario and an HTTP client.
//! [`LoadDriver::start`] spawns one task per virtual worker and hands back a
//! [`RunningLoad`]; [`RunningLoad::wait`] lets the run last for its
//! duration (or until [`StopHandle::stop`]), drains the workers and builds
//! the [`RunReport`].

use crate::config::{ScenarioConfig, MAX_DURATION_SECS};
use crate::error::DriverResult;
use crate::metrics::{MetricsCollector, OutcomeLog, RequestOutcome, ResponseStatus, RunReport};
use crate::report;
use crate::scenario::RequestTemplate;
use crate::threshold;
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{sleep, sleep_until, timeout_at, Instant};
use tracing::{debug, info, warn};

/// Executes a scenario with a fixed pool of virtual workers.
pub struct LoadDriver {
    client: reqwest::Client,
    config: Arc<ScenarioConfig>,
    show_progress: bool,
    request_log: Option<PathBuf>,
}

/// Per-worker tally returned when a worker exits on its own.
#[derive(Debug, Clone, Copy)]
pub struct WorkerStats {
    pub worker: u32,
    pub iterations: u64,
}

impl LoadDriver {
    /// Validate the scenario and build the shared HTTP client. Fails before
    /// any worker exists.
    pub fn new(config: ScenarioConfig) -> DriverResult<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .pool_max_idle_per_host(config.workers as usize)
            .build()?;

        Ok(Self {
            client,
            config: Arc::new(config),
            show_progress: false,
            request_log: None,
        })
    }

    /// Draw a progress bar on stderr while the run is active.
    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.show_progress = enabled;
        self
    }

    /// Write every outcome as JSON lines to `path` once the run ends.
    pub fn with_request_log(mut self, path: Option<PathBuf>) -> Self {
        self.request_log = path;
        self
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    /// Spawn all workers at once.
    pub fn start(&self) -> RunningLoad {
        let config = Arc::clone(&self.config);
        let outcomes = Arc::new(OutcomeLog::new());
        let (stop_tx, _) = watch::channel(false);
        let stop_tx = Arc::new(stop_tx);
        let target: Arc<str> = Arc::from(config.target_url());

        let started_at = Utc::now();
        let started = Instant::now();
        let deadline = started
            .checked_add(config.duration())
            .unwrap_or_else(|| started + Duration::from_secs(MAX_DURATION_SECS));

        info!(
            scenario = %config.name,
            target = %target,
            workers = config.workers,
            duration_secs = config.duration_secs,
            think_time_ms = config.think_time_ms,
            "Starting load run"
        );

        let mut workers = JoinSet::new();
        for id in 0..config.workers {
            let worker = Worker {
                id,
                client: self.client.clone(),
                template: config.request.clone(),
                target: Arc::clone(&target),
                think_time: config.think_time(),
                outcomes: Arc::clone(&outcomes),
                deadline,
            };
            workers.spawn(worker.run(stop_tx.subscribe()));
        }

        let progress = if self.show_progress {
            let pb = ProgressBar::new(config.duration_secs);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len}s {msg}")
            {
                pb.set_style(style.progress_chars("##-"));
            }
            pb
        } else {
            ProgressBar::hidden()
        };

        RunningLoad {
            config,
            outcomes,
            workers,
            stop_tx,
            started_at,
            started,
            deadline,
            progress,
            request_log: self.request_log.clone(),
        }
    }

    /// Start and wait for completion.
    pub async fn run(&self) -> RunReport {
        self.start().wait().await
    }
}

/// Cloneable handle that ends a run early.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }
}

/// A run in progress.
pub struct RunningLoad {
    config: Arc<ScenarioConfig>,
    outcomes: Arc<OutcomeLog>,
    workers: JoinSet<WorkerStats>,
    stop_tx: Arc<watch::Sender<bool>>,
    started_at: chrono::DateTime<Utc>,
    started: Instant,
    deadline: Instant,
    progress: ProgressBar,
    request_log: Option<PathBuf>,
}

impl RunningLoad {
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            tx: Arc::clone(&self.stop_tx),
        }
    }

    /// Ask every worker to stop after its current request.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    /// Outcomes recorded so far.
    pub fn recorded(&self) -> u64 {
        self.outcomes.len()
    }

    /// Wait for the run duration (or an early stop), drain the workers and
    /// build the report.
    pub async fn wait(mut self) -> RunReport {
        let mut stop_rx = self.stop_tx.subscribe();
        let mut ticker = tokio::time::interval(Duration::from_millis(250));

        loop {
            tokio::select! {
                _ = sleep_until(self.deadline) => break,
                _ = stop_rx.wait_for(|stopped| *stopped) => {
                    info!(elapsed_ms = self.started.elapsed().as_millis() as u64, "Run stopped early");
                    break;
                }
                _ = ticker.tick() => self.update_progress(),
            }
        }

        // Measured before the drain so the grace period never counts as run time.
        let elapsed = self
            .started
            .elapsed()
            .min(self.deadline.duration_since(self.started));

        self.stop();
        self.progress.set_message("Waiting for in-flight requests...");
        self.drain().await;
        self.progress.finish_with_message("Complete!");

        let outcomes = self.outcomes.snapshot();
        if let Some(path) = &self.request_log {
            match report::write_request_log(path, &outcomes) {
                Ok(()) => info!(path = %path.display(), entries = outcomes.len(), "Wrote request log"),
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to write request log"),
            }
        }

        let thresholds = threshold::evaluate(&self.config.thresholds, &outcomes);
        let report = MetricsCollector::from_outcomes(self.config.expected_status, &outcomes)
            .results(&self.config, self.started_at, elapsed, thresholds);

        info!(
            scenario = %report.scenario,
            total_requests = report.total_requests,
            passed = report.passed,
            "Load run finished"
        );
        report
    }

    fn update_progress(&self) {
        let elapsed = self.started.elapsed().as_secs();
        self.progress.set_position(elapsed.min(self.config.duration_secs));
        self.progress
            .set_message(format!("{} requests", self.outcomes.len()));
    }

    /// Let in-flight requests finish within the grace period, then abort
    /// whatever is left. An aborted request has recorded nothing.
    async fn drain(&mut self) {
        let grace_deadline = Instant::now() + self.config.grace_period();

        loop {
            match timeout_at(grace_deadline, self.workers.join_next()).await {
                Ok(Some(Ok(stats))) => {
                    debug!(worker = stats.worker, iterations = stats.iterations, "Worker stopped");
                }
                Ok(Some(Err(e))) => {
                    warn!(error = %e, "Worker task failed");
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        remaining = self.workers.len(),
                        grace_period_ms = self.config.grace_period_ms,
                        "Grace period elapsed, aborting in-flight requests"
                    );
                    self.workers.abort_all();
                    while self.workers.join_next().await.is_some() {}
                    break;
                }
            }
        }
    }
}

/// One virtual user.
struct Worker {
    id: u32,
    client: reqwest::Client,
    template: RequestTemplate,
    target: Arc<str>,
    think_time: Duration,
    outcomes: Arc<OutcomeLog>,
    deadline: Instant,
}

impl Worker {
    async fn run(self, mut stop: watch::Receiver<bool>) -> WorkerStats {
        let mut iterations = 0u64;

        loop {
            if *stop.borrow() || Instant::now() >= self.deadline {
                break;
            }

            let outcome = self.execute().await;
            self.outcomes.record(outcome);
            iterations += 1;

            if self.think_time.is_zero() {
                continue;
            }
            tokio::select! {
                _ = sleep(self.think_time) => {}
                _ = stop.changed() => break,
            }
        }

        WorkerStats {
            worker: self.id,
            iterations,
        }
    }

    /// Send one request and describe how it ended. Never fails.
    async fn execute(&self) -> RequestOutcome {
        let (request, request_id) = self.template.build(&self.client, &self.target);
        let timestamp = Utc::now();
        let start = std::time::Instant::now();

        let (status, error) = match request.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                // Drain the body so the connection goes back to the pool. The
                // status line arrived, so a broken body still counts as that status.
                match response.bytes().await {
                    Ok(_) => (ResponseStatus::Http(status), None),
                    Err(e) => {
                        debug!(worker = self.id, status, error = %e, "Failed to read response body");
                        (ResponseStatus::Http(status), Some(format!("body: {}", e)))
                    }
                }
            }
            Err(e) => {
                let kind = if e.is_timeout() {
                    "timeout"
                } else if e.is_connect() {
                    "connect"
                } else {
                    "request"
                };
                debug!(worker = self.id, kind, error = %e, "Request failed");
                (ResponseStatus::TransportError, Some(format!("{}: {}", kind, e)))
            }
        };

        let mut outcome = RequestOutcome::new(self.id, status, start.elapsed())
            .at(timestamp)
            .with_request_id(request_id);
        if let Some(error) = error {
            outcome = outcome.with_error(error);
        }
        outcome
    }
}
