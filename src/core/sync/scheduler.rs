//! Daemon scheduling
//!
//! Runs the coordinator every `sync.interval_seconds` (and once at startup when
//! `sync.run_on_startup` is set). A run is never started while another is in flight. On
//! shutdown an in-flight run gets `sync.shutdown_timeout_secs` to finish.

use super::coordinator::{SyncCoordinator, SyncOptions};
use super::summary::SyncSummary;
use crate::config::SyncConfig;
use crate::domain::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

/// Marks a run as in flight until dropped
pub struct RunGuard {
    flag: Arc<AtomicBool>,
}

impl RunGuard {
    /// Claims the flag; `None` when a run is already in flight
    pub fn try_acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag: flag.clone() })
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Counts of scheduled runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerReport {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Periodic sync loop
pub struct SyncScheduler {
    coordinator: Arc<SyncCoordinator>,
    interval: Duration,
    run_on_startup: bool,
    shutdown_timeout: Duration,
    in_flight: Arc<AtomicBool>,
}

impl SyncScheduler {
    pub fn new(coordinator: Arc<SyncCoordinator>, config: &SyncConfig) -> Self {
        Self {
            coordinator,
            interval: Duration::from_secs(config.interval_seconds),
            run_on_startup: config.run_on_startup,
            shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Overrides the interval between runs
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Runs one sync unless another is in flight
    pub async fn try_run(&self, options: &SyncOptions) -> Option<Result<SyncSummary>> {
        let Some(_guard) = RunGuard::try_acquire(&self.in_flight) else {
            tracing::warn!("Previous sync still running; skipping this run");
            return None;
        };
        Some(self.coordinator.execute_sync(options).await)
    }

    /// Loops until `shutdown` flips to `true` or its sender is dropped
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> SchedulerReport {
        let mut report = SchedulerReport::default();
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            run_on_startup = self.run_on_startup,
            "Sync scheduler started"
        );

        if self.run_on_startup && self.run_once(&mut shutdown, &mut report).await {
            return report;
        }

        let mut ticker = time::interval_at(time::Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    if self.run_once(&mut shutdown, &mut report).await {
                        break;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!(
            completed = report.completed,
            failed = report.failed,
            skipped = report.skipped,
            "Sync scheduler stopped"
        );
        report
    }

    /// Returns `true` when shutdown was requested during the run
    async fn run_once(
        &self,
        shutdown: &mut watch::Receiver<bool>,
        report: &mut SchedulerReport,
    ) -> bool {
        let options = SyncOptions::default();
        let run = self.try_run(&options);
        tokio::pin!(run);

        tokio::select! {
            outcome = &mut run => {
                tally(report, outcome);
                false
            }
            _ = shutdown.changed() => {
                tracing::info!(
                    timeout_secs = self.shutdown_timeout.as_secs(),
                    "Shutdown requested; waiting for in-flight sync"
                );
                match time::timeout(self.shutdown_timeout, &mut run).await {
                    Ok(outcome) => tally(report, outcome),
                    Err(_) => {
                        tracing::warn!("In-flight sync did not finish before the shutdown timeout");
                        report.failed += 1;
                    }
                }
                true
            }
        }
    }
}

fn tally(report: &mut SchedulerReport, outcome: Option<Result<SyncSummary>>) {
    match outcome {
        Some(Ok(_)) => report.completed += 1,
        Some(Err(e)) => {
            tracing::error!(error = %e, "Scheduled sync failed");
            report.failed += 1;
        }
        None => report.skipped += 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_guard_blocks_overlap() {
        let flag = Arc::new(AtomicBool::new(false));
        let first = RunGuard::try_acquire(&flag);
        assert!(first.is_some());
        assert!(RunGuard::try_acquire(&flag).is_none());

        drop(first);
        assert!(RunGuard::try_acquire(&flag).is_some());
    }
}
