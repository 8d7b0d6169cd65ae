//! Periodic progress reporting for the running job.
//!
//! A [`ProgressTicker`] is a spawned task that invokes the job's progress
//! callback on a fixed interval. Reporting is best-effort: the first
//! failed report ends the ticker, and the job carries on regardless.

use std::time::Duration;

use sdbot_core::types::JobId;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::queue::ProgressFn;

/// Handle to a running progress task. Aborted on [`stop`](Self::stop) or drop.
pub struct ProgressTicker {
    handle: JoinHandle<()>,
}

impl ProgressTicker {
    /// Start reporting immediately, then every `interval`.
    pub fn start(job_id: JobId, on_progress: ProgressFn, interval: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if let Err(e) = on_progress().await {
                    tracing::warn!(%job_id, error = %e, "Progress reporting stopped");
                    break;
                }
            }
        });

        Self { handle }
    }

    /// Cancel the task without waiting for an in-progress report.
    pub fn stop(self) {
        self.handle.abort();
    }

    /// Whether the task has exited (stopped itself after a failure, or aborted).
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
