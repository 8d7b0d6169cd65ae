//! Binds a [`Job`] to the lifecycle callbacks the worker understands.
//!
//! The worker knows nothing about jobs or how results are shown. A
//! [`Processor`] owns the job, the remote client, and the caller's
//! presentation hooks (a status sink for progress text and a completion
//! continuation), and turns them into a [`QueueEntry`].

use std::future::Future;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use sdbot_core::types::{JobId, UserId};
use sdbot_webui::{ProgressSnapshot, RemoteGenerationClient};
use tokio::time::Instant;

use crate::error::PipelineError;
use crate::job::{Job, JobKind};
use crate::queue::{AdmissionQueue, ExecutionResult, QueueEntry};

/// Number of cells in the rendered progress bar.
pub const PROGRESS_BAR_CELLS: usize = 25;

/// Receives human-readable progress text for the running job.
pub type StatusFn =
    Arc<dyn Fn(String) -> BoxFuture<'static, Result<(), PipelineError>> + Send + Sync>;

/// Receives the job's final outcome.
pub type OutcomeFn = Box<dyn FnOnce(JobOutcome) -> BoxFuture<'static, ()> + Send>;

/// What a completion continuation is handed once the job settles.
#[derive(Debug)]
pub struct JobOutcome {
    pub job_id: JobId,
    pub kind: JobKind,
    pub result: ExecutionResult,
    /// Time since the job started executing. Zero if it never started.
    pub elapsed: Duration,
}

pub struct Processor {
    client: Arc<dyn RemoteGenerationClient>,
    job: Job,
    job_id: JobId,
    status: Option<StatusFn>,
    completion: Mutex<Option<OutcomeFn>>,
    started_at: OnceLock<Instant>,
    last_status: Mutex<Option<String>>,
}

impl Processor {
    pub fn new(client: Arc<dyn RemoteGenerationClient>, job: Job) -> Self {
        Self {
            client,
            job,
            job_id: JobId::new_v4(),
            status: None,
            completion: Mutex::new(None),
            started_at: OnceLock::new(),
            last_status: Mutex::new(None),
        }
    }

    /// Forward progress text to `sink` while the job runs.
    ///
    /// Without a sink the job is queued without a progress callback and
    /// no ticker runs for it.
    pub fn with_status<F, Fut>(mut self, sink: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), PipelineError>> + Send + 'static,
    {
        self.status = Some(Arc::new(move |text| sink(text).boxed()));
        self
    }

    /// Continuation invoked with the outcome.
    pub fn with_completion<F, Fut>(self, continuation: F) -> Self
    where
        F: FnOnce(JobOutcome) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        *self.completion.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(Box::new(move |outcome| continuation(outcome).boxed()));
        self
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    /// Run the job's remote operation(s).
    pub async fn on_start(&self) -> ExecutionResult {
        self.started_at.get_or_init(Instant::now);
        tracing::debug!(job_id = %self.job_id, kind = %self.job.kind(), "Issuing remote job");
        self.job.execute(self.client.as_ref()).await
    }

    /// Poll the service and forward the formatted status if it changed.
    pub async fn on_progress(&self) -> Result<(), PipelineError> {
        let snapshot = self
            .client
            .poll_progress()
            .await
            .map_err(|e| PipelineError::ProgressPoll(e.to_string()))?;
        let text = format_progress(&snapshot);

        let Some(sink) = &self.status else {
            return Ok(());
        };
        {
            let mut last = self.last_status.lock().unwrap_or_else(PoisonError::into_inner);
            if last.as_deref() == Some(text.as_str()) {
                return Ok(());
            }
            *last = Some(text.clone());
        }

        sink(text).await
    }

    /// Hand the result to the continuation. Later calls are no-ops.
    pub async fn on_complete(&self, result: ExecutionResult) {
        let continuation = self
            .completion
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(continuation) = continuation else {
            return;
        };

        continuation(JobOutcome {
            job_id: self.job_id,
            kind: self.job.kind(),
            result,
            elapsed: self.elapsed(),
        })
        .await;
    }

    /// Time since [`on_start`](Self::on_start) first ran.
    pub fn elapsed(&self) -> Duration {
        self.started_at
            .get()
            .map(Instant::elapsed)
            .unwrap_or_default()
    }

    /// Wrap this processor as a queue entry owned by `user_id`.
    pub fn into_entry(self, user_id: UserId) -> QueueEntry {
        let job_id = self.job_id;
        let has_status = self.status.is_some();
        let processor = Arc::new(self);

        let start = Arc::clone(&processor);
        let mut entry = QueueEntry::new(user_id, move || async move { start.on_start().await })
            .with_job_id(job_id);

        if has_status {
            let progress = Arc::clone(&processor);
            entry = entry.with_progress(move || {
                let progress = Arc::clone(&progress);
                async move { progress.on_progress().await }
            });
        }

        entry.on_complete(move |result| async move { processor.on_complete(result).await })
    }

    /// Submit to `queue` on behalf of `user_id`.
    pub async fn submit(
        self,
        queue: &AdmissionQueue,
        user_id: UserId,
    ) -> Result<JobId, PipelineError> {
        let job_id = self.job_id;
        queue.submit(self.into_entry(user_id)).await?;
        Ok(job_id)
    }
}

/// Render a progress snapshot as status text.
///
/// A zero fraction means the service has not picked the job up yet.
/// Status text reported by the service, if any, goes on its own line
/// below the bar.
pub fn format_progress(snapshot: &ProgressSnapshot) -> String {
    let fraction = snapshot.fraction.clamp(0.0, 1.0);
    if fraction == 0.0 {
        return "Generating... Waiting".to_string();
    }

    let percent = (fraction * 100.0) as u32;
    let filled = ((fraction * PROGRESS_BAR_CELLS as f64) as usize).min(PROGRESS_BAR_CELLS);
    let mut status = format!(
        "Generating... {percent}%\n[{}{}]",
        "━".repeat(filled),
        "─".repeat(PROGRESS_BAR_CELLS - filled),
    );
    if let Some(text) = &snapshot.text {
        status.push('\n');
        status.push_str(text);
    }
    status
}
