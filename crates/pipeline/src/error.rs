//! Error taxonomy of the admission and execution pipeline.

use std::time::Duration;

use sdbot_core::types::UserId;
use sdbot_webui::WebUiApiError;

/// Errors surfaced by the pipeline.
///
/// [`QuotaExceeded`](Self::QuotaExceeded) and [`QueueClosed`](Self::QueueClosed)
/// are returned synchronously from [`AdmissionQueue::submit`](crate::queue::AdmissionQueue::submit).
/// Every other variant reaches the caller through the job's completion
/// callback.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The user already has as many jobs in flight as their limit allows.
    #[error("Maximum number of concurrent requests reached ({limit}) for user {user_id}")]
    QuotaExceeded { user_id: UserId, limit: usize },

    /// The worker has shut down and no longer accepts jobs.
    #[error("Job queue is closed")]
    QueueClosed,

    /// The remote generation call failed.
    #[error("Remote execution failed: {0}")]
    RemoteExecution(#[from] WebUiApiError),

    /// The job could not be issued because a required setting is invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A progress update could not be produced or delivered.
    #[error("Progress poll failed: {0}")]
    ProgressPoll(String),

    /// The job did not settle within the configured bound.
    #[error("Job timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The job's execution panicked.
    #[error("Job panicked: {0}")]
    Panicked(String),

    /// The job was still queued when the worker shut down.
    #[error("Job cancelled before it started")]
    Cancelled,
}

impl PipelineError {
    /// Whether this is an admission-time quota rejection.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}
