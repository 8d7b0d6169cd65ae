//! The single job executor.
//!
//! [`QueueWorker`] drains the admission queue one entry at a time, so at
//! most one job runs at any instant no matter how many users are
//! waiting. Start order is admission order, and because execution is
//! serial it is also completion order.
//!
//! For each entry the worker:
//! 1. starts a [`ProgressTicker`] if the entry reports progress,
//! 2. runs the job (with an optional timeout),
//! 3. stops the ticker and releases the user's quota slot,
//! 4. hands the result, success or failure, to the completion callback.
//!
//! Job failures never escape the loop; they reach the caller only
//! through the completion callback.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use sdbot_core::types::JobId;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::QueueConfig;
use crate::error::PipelineError;
use crate::events::QueueEvent;
use crate::queue::{Admitted, CompleteFn, ExecutionResult, QueueEntry, QueueShared, StartFn};
use crate::ticker::ProgressTicker;

/// Consumer side of the admission queue.
///
/// Obtained from [`AdmissionQueue::new`](crate::queue::AdmissionQueue::new).
/// Exactly one exists per queue.
pub struct QueueWorker {
    rx: mpsc::Receiver<Admitted>,
    shared: Arc<QueueShared>,
    progress_interval: Duration,
    job_timeout: Option<Duration>,
}

impl QueueWorker {
    pub(crate) fn new(
        rx: mpsc::Receiver<Admitted>,
        shared: Arc<QueueShared>,
        config: &QueueConfig,
    ) -> Self {
        Self {
            rx,
            shared,
            progress_interval: config.progress_interval,
            job_timeout: config.job_timeout,
        }
    }

    /// Run the loop until `cancel` fires or every submit handle is dropped.
    ///
    /// Cancellation is only observed between jobs. On the way out the
    /// queue is closed and each entry still waiting in it is completed
    /// with [`PipelineError::Cancelled`].
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(
            progress_interval_ms = self.progress_interval.as_millis() as u64,
            job_timeout_secs = self.job_timeout.map(|t| t.as_secs()),
            "Queue worker started",
        );

        loop {
            let admitted = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Queue worker shutting down");
                    break;
                }
                next = self.rx.recv() => match next {
                    Some(admitted) => admitted,
                    None => {
                        tracing::info!("All queue handles dropped");
                        break;
                    }
                },
            };

            self.execute(admitted).await;
        }

        self.drain().await;
    }

    /// Execute one entry end to end.
    async fn execute(&self, admitted: Admitted) {
        let Admitted {
            entry,
            permit,
            queued,
        } = admitted;
        let QueueEntry {
            job_id,
            user_id,
            on_start,
            on_progress,
            on_complete,
        } = entry;

        drop(queued);
        self.shared.set_running(true);
        self.shared.emit(QueueEvent::Started {
            job_id,
            user_id,
            at: chrono::Utc::now(),
        });
        tracing::info!(%job_id, user_id, "Job started");

        let started = Instant::now();
        let ticker = on_progress
            .map(|report| ProgressTicker::start(job_id, report, self.progress_interval));

        let result = self.run_job(on_start).await;

        if let Some(ticker) = ticker {
            ticker.stop();
        }
        drop(permit);
        self.shared.set_running(false);

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(output) => {
                tracing::info!(
                    %job_id,
                    user_id,
                    elapsed_ms,
                    images = output.images.len(),
                    "Job finished",
                );
                self.shared.emit(QueueEvent::Finished {
                    job_id,
                    user_id,
                    elapsed_ms,
                    at: chrono::Utc::now(),
                });
            }
            Err(e) => {
                tracing::warn!(%job_id, user_id, elapsed_ms, error = %e, "Job failed");
                self.shared.emit(QueueEvent::Failed {
                    job_id,
                    user_id,
                    error: e.to_string(),
                    at: chrono::Utc::now(),
                });
            }
        }

        deliver(job_id, on_complete, result).await;
    }

    /// Await the job, converting a timeout or panic into an error result.
    async fn run_job(&self, on_start: StartFn) -> ExecutionResult {
        let job = AssertUnwindSafe(async move { on_start().await }).catch_unwind();

        let outcome = match self.job_timeout {
            Some(limit) => match tokio::time::timeout(limit, job).await {
                Ok(outcome) => outcome,
                Err(_) => return Err(PipelineError::Timeout(limit)),
            },
            None => job.await,
        };

        outcome.unwrap_or_else(|panic| Err(PipelineError::Panicked(panic_message(&*panic))))
    }

    /// Close the queue and cancel everything still waiting in it.
    async fn drain(&mut self) {
        self.rx.close();

        let mut drained = 0usize;
        while let Some(Admitted {
            entry,
            permit,
            queued,
        }) = self.rx.recv().await
        {
            drop(queued);
            drop(permit);
            self.shared.emit(QueueEvent::Failed {
                job_id: entry.job_id,
                user_id: entry.user_id,
                error: PipelineError::Cancelled.to_string(),
                at: chrono::Utc::now(),
            });
            deliver(entry.job_id, entry.on_complete, Err(PipelineError::Cancelled)).await;
            drained += 1;
        }

        tracing::info!(drained, "Queue worker stopped");
    }
}

/// Invoke the completion callback, containing any panic it raises.
async fn deliver(job_id: JobId, on_complete: Option<CompleteFn>, result: ExecutionResult) {
    let Some(on_complete) = on_complete else {
        return;
    };
    let delivery = AssertUnwindSafe(async move { on_complete(result).await }).catch_unwind();
    if let Err(panic) = delivery.await {
        tracing::error!(
            %job_id,
            panic = %panic_message(&*panic),
            "Completion callback panicked",
        );
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
