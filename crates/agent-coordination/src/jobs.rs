//! Fixed-interval background jobs
//!
//! Each job gets its own loop. A loop awaits `run_once` before taking the
//! next tick, so a job never overlaps with itself; ticks missed while a run
//! was in progress are skipped rather than replayed.

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::{CoordinationError, Result};

/// Work that runs on a timer
#[async_trait]
pub trait PeriodicJob: Send + Sync {
    fn name(&self) -> &str;

    /// One pass. Errors are logged and counted; the loop keeps going.
    async fn run_once(&self) -> Result<()>;
}

/// Counters of one job loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    pub name: String,
    pub runs: u64,
    pub failures: u64,
}

#[derive(Default)]
struct Counters {
    runs: AtomicU64,
    failures: AtomicU64,
}

struct RunningJob {
    name: String,
    counters: Arc<Counters>,
    handle: JoinHandle<()>,
}

/// Owns the loops of all spawned jobs
pub struct JobRunner {
    shutdown_tx: watch::Sender<bool>,
    jobs: Vec<RunningJob>,
}

impl Default for JobRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRunner {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            jobs: Vec::new(),
        }
    }

    /// Run `job` every `period`, first after one full period
    ///
    /// A zero period is refused.
    pub fn spawn(&mut self, job: Arc<dyn PeriodicJob>, period: Duration) -> Result<()> {
        let name = job.name().to_string();
        if period.is_zero() {
            return Err(CoordinationError::invalid_input(format!(
                "job {} needs a non-zero period",
                name
            )));
        }
        let counters = Arc::new(Counters::default());
        let shutdown = self.shutdown_tx.subscribe();

        tracing::info!(job = %name, period_secs = period.as_secs_f64(), "Starting periodic job");
        let handle = tokio::spawn(run_loop(job, period, Arc::clone(&counters), shutdown));

        self.jobs.push(RunningJob {
            name,
            counters,
            handle,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Current counters, in spawn order
    pub fn stats(&self) -> Vec<JobStats> {
        self.jobs.iter().map(RunningJob::stats).collect()
    }

    /// Stop every loop and wait for in-flight runs to finish
    pub async fn shutdown(self) -> Vec<JobStats> {
        let _ = self.shutdown_tx.send(true);

        let mut stats = Vec::with_capacity(self.jobs.len());
        for job in self.jobs {
            if let Err(e) = job.handle.await {
                tracing::error!(job = %job.name, error = %e, "Job loop ended abnormally");
            }
            stats.push(JobStats {
                name: job.name,
                runs: job.counters.runs.load(Ordering::SeqCst),
                failures: job.counters.failures.load(Ordering::SeqCst),
            });
        }
        tracing::info!(jobs = stats.len(), "Periodic jobs stopped");
        stats
    }
}

impl RunningJob {
    fn stats(&self) -> JobStats {
        JobStats {
            name: self.name.clone(),
            runs: self.counters.runs.load(Ordering::SeqCst),
            failures: self.counters.failures.load(Ordering::SeqCst),
        }
    }
}

async fn run_loop(
    job: Arc<dyn PeriodicJob>,
    period: Duration,
    counters: Arc<Counters>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                counters.runs.fetch_add(1, Ordering::SeqCst);
                match AssertUnwindSafe(job.run_once()).catch_unwind().await {
                    Ok(Ok(())) => {
                        tracing::trace!(job = job.name(), "Job run finished");
                    }
                    Ok(Err(e)) => {
                        counters.failures.fetch_add(1, Ordering::SeqCst);
                        tracing::warn!(job = job.name(), error = %e, "Job run failed");
                    }
                    Err(panic) => {
                        counters.failures.fetch_add(1, Ordering::SeqCst);
                        tracing::error!(
                            job = job.name(),
                            panic = %agent_core::panic_message(panic.as_ref()),
                            "Job run panicked"
                        );
                    }
                }
            }
        }
    }
}
