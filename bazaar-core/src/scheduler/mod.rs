//! Periodic job scheduler.
//!
//! Each registered job gets its own ticker loop. A per-job run-lock makes
//! a tick (or a manual trigger) that finds the previous run still in flight
//! skip instead of overlapping it. A job's error or panic is logged and the
//! next tick runs as usual.

pub mod jobs;

use crate::error::{LedgerError, StoreError};
use crate::notify::NotifyError;
use crate::rate_limit::CounterError;
use async_trait::async_trait;
use bazaar_sdk::objects::JobRunOutcome;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Counter(#[from] CounterError),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    /// Some items failed; each was logged where it failed.
    #[error("{failed} of {total} items failed")]
    Incomplete { failed: usize, total: usize },
}

#[async_trait]
pub trait Job: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// One idempotent pass.
    async fn run(&self) -> Result<(), JobError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed,
    /// The previous run of the same job had not finished.
    SkippedInFlight,
}

impl From<RunOutcome> for JobRunOutcome {
    fn from(value: RunOutcome) -> Self {
        match value {
            RunOutcome::Completed => JobRunOutcome::Completed,
            RunOutcome::Failed => JobRunOutcome::Failed,
            RunOutcome::SkippedInFlight => JobRunOutcome::SkippedInFlight,
        }
    }
}

#[derive(Clone)]
struct JobSlot {
    job: Arc<dyn Job>,
    period: Duration,
    running: Arc<AtomicBool>,
}

/// Clears the run-lock when dropped, including during a panic unwind.
struct RunLock(Arc<AtomicBool>);

impl Drop for RunLock {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl JobSlot {
    async fn run_guarded(&self) -> RunOutcome {
        let name = self.job.name();
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(job = name, "Previous run still in flight, skipping");
            return RunOutcome::SkippedInFlight;
        }

        let lock = RunLock(self.running.clone());
        let job = self.job.clone();
        let started = Instant::now();
        let result = tokio::spawn(async move {
            let _lock = lock;
            job.run().await
        })
        .await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(Ok(())) => {
                info!(job = name, elapsed_ms, "Job completed");
                RunOutcome::Completed
            }
            Ok(Err(e)) => {
                error!(job = name, elapsed_ms, error = %e, "Job failed");
                RunOutcome::Failed
            }
            Err(e) => {
                error!(job = name, panicked = e.is_panic(), error = %e, "Job aborted");
                RunOutcome::Failed
            }
        }
    }
}

/// Cloneable handle for triggering jobs by name outside their schedule.
#[derive(Clone)]
pub struct SchedulerHandle {
    slots: Arc<HashMap<&'static str, JobSlot>>,
}

impl SchedulerHandle {
    /// Run `name` now, honoring its run-lock. `None` if no such job.
    pub async fn run_now(&self, name: &str) -> Option<RunOutcome> {
        let slot = self.slots.get(name)?;
        info!(job = name, "Manual job run requested");
        Some(slot.run_guarded().await)
    }

    pub fn job_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.slots.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

#[derive(Default)]
pub struct Scheduler {
    slots: HashMap<&'static str, JobSlot>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `job` to run every `period`. A later job with the same name
    /// replaces the earlier one.
    pub fn with_job(mut self, job: Arc<dyn Job>, period: Duration) -> Self {
        let slot = JobSlot {
            job,
            period,
            running: Arc::new(AtomicBool::new(false)),
        };
        self.slots.insert(slot.job.name(), slot);
        self
    }

    /// Handle sharing this scheduler's run-locks.
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            slots: Arc::new(self.slots.clone()),
        }
    }

    /// Run every job loop until shutdown.
    pub async fn run(self, shutdown_rx: watch::Receiver<bool>) {
        info!("Scheduler started with {} jobs", self.slots.len());

        let loops: Vec<JoinHandle<()>> = self
            .slots
            .into_values()
            .map(|slot| tokio::spawn(job_loop(slot, shutdown_rx.clone())))
            .collect();
        for handle in loops {
            if let Err(e) = handle.await {
                error!(error = %e, "Job loop terminated abnormally");
            }
        }

        info!("Scheduler shutdown complete");
    }
}

async fn job_loop(slot: JobSlot, mut shutdown_rx: watch::Receiver<bool>) {
    let name = slot.job.name();
    let mut ticker = tokio::time::interval(slot.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    debug!(job = name, period = ?slot.period, "Job loop started");

    loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    debug!(job = name, "Job loop received shutdown signal");
                    break;
                }
            }

            _ = ticker.tick() => {
                slot.run_guarded().await;
            }
        }
    }
}
