//! Lifecycle events emitted by the admission queue and worker.
//!
//! Delivered over a [`tokio::sync::broadcast`] channel; call
//! [`AdmissionQueue::subscribe`](crate::queue::AdmissionQueue::subscribe)
//! to receive them. Nothing in the pipeline depends on anyone listening.

use serde::Serialize;
use sdbot_core::types::{JobId, Timestamp, UserId};

/// Broadcast channel capacity for queue events.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A state change of one job.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    /// The job passed the quota check and entered the queue.
    Admitted {
        job_id: JobId,
        user_id: UserId,
        at: Timestamp,
    },

    /// The job was refused at submission.
    Rejected {
        user_id: UserId,
        reason: String,
        at: Timestamp,
    },

    /// The worker began executing the job.
    Started {
        job_id: JobId,
        user_id: UserId,
        at: Timestamp,
    },

    /// The job finished successfully.
    Finished {
        job_id: JobId,
        user_id: UserId,
        elapsed_ms: u64,
        at: Timestamp,
    },

    /// The job failed, timed out, or was cancelled.
    Failed {
        job_id: JobId,
        user_id: UserId,
        error: String,
        at: Timestamp,
    },
}

impl QueueEvent {
    /// The job this event refers to, if it was admitted.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            Self::Admitted { job_id, .. }
            | Self::Started { job_id, .. }
            | Self::Finished { job_id, .. }
            | Self::Failed { job_id, .. } => Some(*job_id),
            Self::Rejected { .. } => None,
        }
    }
}
