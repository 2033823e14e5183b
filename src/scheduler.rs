//! Fixed-delay loop around the dispatcher.
//!
//! The next cycle starts `delay` after the previous one ended, so a long cycle
//! pushes the schedule back instead of overlapping.

use std::time::Duration;

use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::dispatch::{CycleReport, Dispatcher};
use crate::error::PickerResult;

/// Totals over the lifetime of one [`Scheduler::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub cycles: u64,
    pub files_processed: u64,
    pub files_failed: u64,
    /// Cycles that ended in an error.
    pub cycle_errors: u64,
}

impl SchedulerStats {
    fn record(&mut self, report: &CycleReport) {
        self.files_processed += report.processed as u64;
        self.files_failed += report.failed as u64;
    }
}

pub struct Scheduler {
    dispatcher: Dispatcher,
    delay: Duration,
    halt_on_error: bool,
}

impl Scheduler {
    pub fn new(dispatcher: Dispatcher, delay: Duration, halt_on_error: bool) -> Self {
        Self {
            dispatcher,
            delay,
            halt_on_error,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Cycle until `shutdown` is cancelled.
    ///
    /// With `halt_on_error` the first failed cycle, or the first cycle that
    /// left a file behind, ends the loop and its error is returned; otherwise
    /// failures are logged and the next cycle is scheduled as usual. A running cycle is never interrupted.
    pub async fn run(&self, shutdown: CancellationToken) -> PickerResult<SchedulerStats> {
        tracing::info!(delay_secs = self.delay.as_secs(), "picker started");
        let mut stats = SchedulerStats::default();
        let mut next_run = Instant::now();

        loop {
            if Instant::now() < next_run {
                let wait_started = Instant::now();
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = sleep_until(next_run) => {}
                }
                tracing::debug!(elapsed_ms = wait_started.elapsed().as_millis() as u64, "wait over");
            }
            if shutdown.is_cancelled() {
                break;
            }

            let cycle_started = Instant::now();
            stats.cycles += 1;
            match self.dispatcher.run_cycle().await {
                Ok(report) if self.halt_on_error && !report.failures.is_empty() => {
                    stats.record(&report);
                    if let Some(e) = report.into_first_error() {
                        tracing::error!(cycle = stats.cycles, error = %e, "file failed, stopping picker");
                        return Err(e);
                    }
                }
                Ok(report) => stats.record(&report),
                Err(e) if self.halt_on_error => {
                    tracing::error!(cycle = stats.cycles, error = %e, "cycle failed, stopping picker");
                    return Err(e);
                }
                Err(e) => {
                    stats.cycle_errors += 1;
                    tracing::error!(cycle = stats.cycles, error = %e, "cycle failed");
                }
            }

            let cycle_ended = Instant::now();
            tracing::debug!(
                cycle = stats.cycles,
                elapsed_ms = (cycle_ended - cycle_started).as_millis() as u64,
                "cycle finished"
            );
            next_run = cycle_ended + self.delay;
        }

        tracing::info!(cycles = stats.cycles, "picker stopped");
        Ok(stats)
    }
}
