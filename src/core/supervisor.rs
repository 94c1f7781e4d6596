//! Run supervisor
//!
//! Drives the engine on a fixed interval with at most one run in flight.
//! Runs that exceed the maximum duration are abandoned and counted as
//! failed; because writes are idempotent the next run repairs any partial
//! work. Manual triggers queue behind the current run.

use crate::config::SchedulerConfig;
use crate::core::sync::{RunSummary, SyncEngine, SyncMode};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

/// Supervisor settings
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub interval: Duration,
    pub max_run_duration: Duration,
    /// Stop after this many failed runs in a row (0 = never)
    pub max_consecutive_failures: u32,
    /// Stop after this many runs (None = never)
    pub max_runs: Option<u64>,
}

impl SupervisorConfig {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.interval_seconds),
            max_run_duration: Duration::from_secs(config.max_run_duration_seconds),
            max_consecutive_failures: config.max_consecutive_failures,
            max_runs: None,
        }
    }
}

/// Lifecycle state of the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Running,
    Succeeded,
    Failed,
}

/// Snapshot published after every state change
#[derive(Debug, Clone)]
pub struct SupervisorStatus {
    pub state: SupervisorState,
    pub total_runs: u64,
    pub consecutive_failures: u32,
    pub last_summary: Option<RunSummary>,
}

impl Default for SupervisorStatus {
    fn default() -> Self {
        Self {
            state: SupervisorState::Idle,
            total_runs: 0,
            consecutive_failures: 0,
            last_summary: None,
        }
    }
}

/// Why [`Supervisor::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorExit {
    Shutdown,
    MaxRunsReached,
    TooManyFailures(u32),
}

/// Cloneable handle for triggering runs and reading status
#[derive(Clone)]
pub struct SupervisorHandle {
    trigger_tx: mpsc::Sender<SyncMode>,
    status_rx: watch::Receiver<SupervisorStatus>,
}

impl SupervisorHandle {
    /// Requests a run as soon as the current one (if any) finishes.
    ///
    /// Returns false if a triggered run is already queued.
    pub fn trigger(&self, full_history: bool) -> bool {
        let mode = if full_history {
            SyncMode::FullHistory
        } else {
            SyncMode::Incremental
        };
        self.trigger_tx.try_send(mode).is_ok()
    }

    pub fn status(&self) -> SupervisorStatus {
        self.status_rx.borrow().clone()
    }

    /// Waits until the status changes
    pub async fn changed(&mut self) -> bool {
        self.status_rx.changed().await.is_ok()
    }
}

/// Schedules engine runs, one at a time
pub struct Supervisor {
    engine: Arc<SyncEngine>,
    config: SupervisorConfig,
    status_tx: watch::Sender<SupervisorStatus>,
    trigger_tx: mpsc::Sender<SyncMode>,
    trigger_rx: mpsc::Receiver<SyncMode>,
}

impl Supervisor {
    pub fn new(engine: Arc<SyncEngine>, config: SupervisorConfig) -> Self {
        let (status_tx, _) = watch::channel(SupervisorStatus::default());
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        Self {
            engine,
            config,
            status_tx,
            trigger_tx,
            trigger_rx,
        }
    }

    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            trigger_tx: self.trigger_tx.clone(),
            status_rx: self.status_tx.subscribe(),
        }
    }

    pub fn status(&self) -> SupervisorStatus {
        self.status_tx.borrow().clone()
    }

    /// Executes one run bounded by the maximum run duration
    pub async fn run_once(&self, mode: SyncMode) -> RunSummary {
        self.status_tx
            .send_modify(|status| status.state = SupervisorState::Running);

        let started = Instant::now();
        let summary =
            match tokio::time::timeout(self.config.max_run_duration, self.engine.execute(mode))
                .await
            {
                Ok(summary) => summary,
                Err(_) => {
                    tracing::error!(
                        max_run_duration_secs = self.config.max_run_duration.as_secs(),
                        "Sync run exceeded its time limit and was abandoned"
                    );
                    self.abandon(
                        mode,
                        format!(
                            "Run exceeded {}s and was abandoned",
                            self.config.max_run_duration.as_secs()
                        ),
                        started,
                    )
                    .await
                }
            };

        self.record(&summary);
        summary
    }

    /// Runs on the interval until shutdown or an exit condition.
    ///
    /// The first run starts immediately, in `first_mode`. A shutdown signal
    /// during a run abandons that run.
    pub async fn run(
        mut self,
        mut shutdown: watch::Receiver<bool>,
        first_mode: SyncMode,
    ) -> SupervisorExit {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut pending_first = Some(first_mode);
        let mut runs: u64 = 0;

        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            max_run_duration_secs = self.config.max_run_duration.as_secs(),
            "Supervisor started"
        );

        loop {
            if *shutdown.borrow() {
                return SupervisorExit::Shutdown;
            }

            let mode = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => return SupervisorExit::Shutdown,
                Some(mode) = self.trigger_rx.recv() => {
                    tracing::info!(mode = %mode, "Manual sync triggered");
                    mode
                }
                _ = ticker.tick() => pending_first.take().unwrap_or(SyncMode::Incremental),
            };

            let started = Instant::now();
            let summary = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => {
                    tracing::warn!("Shutdown requested during a sync run, abandoning it");
                    let summary = self
                        .abandon(mode, "Interrupted by shutdown".to_string(), started)
                        .await;
                    self.record(&summary);
                    return SupervisorExit::Shutdown;
                }
                summary = self.run_once(mode) => summary,
            };

            runs += 1;
            if self.config.max_runs.is_some_and(|max| runs >= max) {
                tracing::info!(runs, "Reached the configured number of runs");
                return SupervisorExit::MaxRunsReached;
            }

            let failures = self.status_tx.borrow().consecutive_failures;
            if !summary.is_successful()
                && self.config.max_consecutive_failures > 0
                && failures >= self.config.max_consecutive_failures
            {
                tracing::error!(
                    consecutive_failures = failures,
                    "Too many consecutive failed runs, stopping"
                );
                return SupervisorExit::TooManyFailures(failures);
            }
        }
    }

    async fn abandon(&self, mode: SyncMode, reason: String, started: Instant) -> RunSummary {
        let options = self.engine.options();
        let mut summary = RunSummary::new(options.pipeline_id.clone(), mode, options.dry_run, None);
        summary.fail(reason, started.elapsed());
        self.engine.record_abandoned(&summary).await;
        summary
    }

    fn record(&self, summary: &RunSummary) {
        self.status_tx.send_modify(|status| {
            status.total_runs += 1;
            if summary.is_successful() {
                status.state = SupervisorState::Succeeded;
                status.consecutive_failures = 0;
            } else {
                status.state = SupervisorState::Failed;
                status.consecutive_failures += 1;
            }
            status.last_summary = Some(summary.clone());
        });
    }
}

/// Resolves once shutdown is requested. Never resolves if the sender is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
