//! Bounded FIFO admission queue with per-user quotas.
//!
//! [`AdmissionQueue`] is the submit side: a cheap-to-clone handle that
//! request handlers share. Each submission is checked against the
//! user's quota and, if admitted, placed on a bounded channel drained by
//! the single [`QueueWorker`]. When the channel is full, `submit` waits
//! for space rather than dropping the job.
//!
//! Quota is held by a [`QuotaPermit`] that travels with the entry and
//! releases the user's slot when dropped, so a slot is returned exactly
//! once whether the job completes, fails, or is discarded unexecuted.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;
use futures::FutureExt;
use sdbot_core::types::{JobId, UserId};
use sdbot_core::CoreError;
use sdbot_webui::GenerationOutput;
use tokio::sync::{broadcast, mpsc};

use crate::config::QueueConfig;
use crate::error::PipelineError;
use crate::events::{QueueEvent, EVENT_CHANNEL_CAPACITY};
use crate::quota::QuotaLedger;
use crate::worker::QueueWorker;

/// What a job produces: generated images, or the reason there are none.
pub type ExecutionResult = Result<GenerationOutput, PipelineError>;

/// Runs the job. Invoked once, by the worker.
pub type StartFn = Box<dyn FnOnce() -> BoxFuture<'static, ExecutionResult> + Send>;

/// Reports progress of the running job. Invoked repeatedly by the ticker;
/// an `Err` stops further reporting for this job.
pub type ProgressFn =
    Arc<dyn Fn() -> BoxFuture<'static, Result<(), PipelineError>> + Send + Sync>;

/// Receives the job's result. Invoked exactly once per admitted job.
pub type CompleteFn = Box<dyn FnOnce(ExecutionResult) -> BoxFuture<'static, ()> + Send>;

/// One job plus its lifecycle callbacks, as submitted by a caller.
pub struct QueueEntry {
    pub(crate) job_id: JobId,
    pub(crate) user_id: UserId,
    pub(crate) on_start: StartFn,
    pub(crate) on_progress: Option<ProgressFn>,
    pub(crate) on_complete: Option<CompleteFn>,
}

impl QueueEntry {
    /// Create an entry for `user_id` whose execution is `on_start`.
    pub fn new<F, Fut>(user_id: UserId, on_start: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ExecutionResult> + Send + 'static,
    {
        Self {
            job_id: JobId::new_v4(),
            user_id,
            on_start: Box::new(move || on_start().boxed()),
            on_progress: None,
            on_complete: None,
        }
    }

    /// Use a caller-chosen job id instead of a generated one.
    pub fn with_job_id(mut self, job_id: JobId) -> Self {
        self.job_id = job_id;
        self
    }

    /// Report progress periodically while this job runs.
    pub fn with_progress<F, Fut>(mut self, on_progress: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), PipelineError>> + Send + 'static,
    {
        self.on_progress = Some(Arc::new(move || on_progress().boxed()));
        self
    }

    /// Receive the job's result once it settles.
    pub fn on_complete<F, Fut>(mut self, on_complete: F) -> Self
    where
        F: FnOnce(ExecutionResult) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_complete = Some(Box::new(move |result| on_complete(result).boxed()));
        self
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}

impl std::fmt::Debug for QueueEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueEntry")
            .field("job_id", &self.job_id)
            .field("user_id", &self.user_id)
            .field("has_progress", &self.on_progress.is_some())
            .field("has_complete", &self.on_complete.is_some())
            .finish()
    }
}

/// State shared between the submit handles and the worker.
pub(crate) struct QueueShared {
    ledger: Mutex<QuotaLedger>,
    /// Admitted entries the worker has not started yet.
    pending: AtomicUsize,
    /// Whether the worker is executing a job right now.
    running: AtomicBool,
    events: broadcast::Sender<QueueEvent>,
}

impl QueueShared {
    fn ledger(&self) -> MutexGuard<'_, QuotaLedger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check the limit and take a slot under one lock.
    fn acquire(self: &Arc<Self>, user_id: UserId) -> Result<QuotaPermit, PipelineError> {
        self.ledger().try_acquire(user_id)?;
        Ok(QuotaPermit {
            shared: Arc::clone(self),
            user_id,
        })
    }

    pub(crate) fn emit(&self, event: QueueEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }
}

/// One user's quota slot. Released on drop.
pub(crate) struct QuotaPermit {
    shared: Arc<QueueShared>,
    user_id: UserId,
}

impl Drop for QuotaPermit {
    fn drop(&mut self) {
        self.shared.ledger().release(self.user_id);
    }
}

/// Counts one entry in [`AdmissionQueue::size`] until dropped.
///
/// Dropped by the worker when it takes the entry off the queue, or with
/// the entry if the queue discards it.
pub(crate) struct QueuedMarker {
    shared: Arc<QueueShared>,
}

impl QueuedMarker {
    fn new(shared: &Arc<QueueShared>) -> Self {
        shared.pending.fetch_add(1, Ordering::SeqCst);
        Self {
            shared: Arc::clone(shared),
        }
    }
}

impl Drop for QueuedMarker {
    fn drop(&mut self) {
        self.shared.pending.fetch_sub(1, Ordering::SeqCst);
    }
}

/// An entry that passed admission, with the slot it holds.
pub(crate) struct Admitted {
    pub(crate) entry: QueueEntry,
    pub(crate) permit: QuotaPermit,
    pub(crate) queued: QueuedMarker,
}

/// Submit handle of the job queue.
#[derive(Clone)]
pub struct AdmissionQueue {
    tx: mpsc::Sender<Admitted>,
    shared: Arc<QueueShared>,
}

impl AdmissionQueue {
    /// Build the queue and the worker that drains it.
    ///
    /// The worker does nothing until [`QueueWorker::run`] is awaited,
    /// typically in a task spawned once at startup.
    pub fn new(config: &QueueConfig) -> Result<(Self, QueueWorker), CoreError> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.capacity);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let shared = Arc::new(QueueShared {
            ledger: Mutex::new(QuotaLedger::new(
                config.default_limit,
                config.user_limits.clone(),
            )),
            pending: AtomicUsize::new(0),
            running: AtomicBool::new(false),
            events,
        });

        let worker = QueueWorker::new(rx, Arc::clone(&shared), config);
        Ok((Self { tx, shared }, worker))
    }

    /// Admit `entry` for execution.
    ///
    /// Fails with [`PipelineError::QuotaExceeded`] when the user is
    /// already at their limit, and with [`PipelineError::QueueClosed`]
    /// once the worker has shut down; in both cases the user's count is
    /// unchanged and `entry` is dropped without its callbacks running.
    ///
    /// Waits while the queue is at capacity. The user's slot is held
    /// during the wait; if the returned future is dropped before space
    /// frees up, the slot is released and the queue size is unaffected.
    pub async fn submit(&self, entry: QueueEntry) -> Result<(), PipelineError> {
        let job_id = entry.job_id;
        let user_id = entry.user_id;

        if self.tx.is_closed() {
            return Err(PipelineError::QueueClosed);
        }

        let permit = match self.shared.acquire(user_id) {
            Ok(permit) => permit,
            Err(e) => {
                tracing::info!(user_id, error = %e, "Job rejected");
                self.shared.emit(QueueEvent::Rejected {
                    user_id,
                    reason: e.to_string(),
                    at: chrono::Utc::now(),
                });
                return Err(e);
            }
        };

        // Dropping `permit` on either early return releases the slot.
        let Ok(space) = self.tx.reserve().await else {
            tracing::info!(%job_id, user_id, "Queue closed while waiting for space");
            return Err(PipelineError::QueueClosed);
        };

        let queued = QueuedMarker::new(&self.shared);
        self.shared.emit(QueueEvent::Admitted {
            job_id,
            user_id,
            at: chrono::Utc::now(),
        });
        tracing::info!(%job_id, user_id, queued = self.size(), "Job admitted");

        space.send(Admitted {
            entry,
            permit,
            queued,
        });
        Ok(())
    }

    /// Admitted jobs that have not started yet.
    pub fn size(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }

    /// Jobs ahead of a new submission, counting the one running now.
    pub fn reported_size(&self) -> usize {
        self.size() + usize::from(self.is_running())
    }

    /// Whether the worker is executing a job right now.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Jobs `user_id` has admitted and not yet completed.
    pub fn in_flight(&self, user_id: UserId) -> usize {
        self.shared.ledger().in_flight(user_id)
    }

    /// The quota that applies to `user_id`.
    pub fn limit_for(&self, user_id: UserId) -> usize {
        self.shared.ledger().limit_for(user_id)
    }

    /// Users with at least one job in flight.
    pub fn active_users(&self) -> usize {
        self.shared.ledger().active_users()
    }

    /// Whether the worker has stopped accepting jobs.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Subscribe to job lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.shared.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn idle_entry(user_id: UserId) -> QueueEntry {
        QueueEntry::new(user_id, || async { Ok(GenerationOutput::default()) })
    }

    fn config(limit: usize, capacity: usize) -> QueueConfig {
        QueueConfig {
            default_limit: limit,
            capacity,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn admission_increments_before_execution() {
        let (queue, _worker) = AdmissionQueue::new(&config(4, 10)).unwrap();
        queue.submit(idle_entry(1)).await.unwrap();
        queue.submit(idle_entry(1)).await.unwrap();
        assert_eq!(queue.in_flight(1), 2);
        assert_eq!(queue.size(), 2);
        assert_eq!(queue.reported_size(), 2);
    }

    #[tokio::test]
    async fn quota_rejection_leaves_counter_untouched() {
        let (queue, _worker) = AdmissionQueue::new(&config(2, 10)).unwrap();
        queue.submit(idle_entry(5)).await.unwrap();
        queue.submit(idle_entry(5)).await.unwrap();

        let err = queue.submit(idle_entry(5)).await.unwrap_err();
        assert_matches!(err, PipelineError::QuotaExceeded { user_id: 5, limit: 2 });
        assert_eq!(queue.in_flight(5), 2);
        assert_eq!(queue.size(), 2);

        // Other users are unaffected.
        queue.submit(idle_entry(6)).await.unwrap();
    }

    #[tokio::test]
    async fn dropping_the_worker_releases_queued_slots() {
        let (queue, worker) = AdmissionQueue::new(&config(4, 10)).unwrap();
        queue.submit(idle_entry(1)).await.unwrap();
        assert_eq!(queue.active_users(), 1);

        drop(worker);
        assert!(queue.is_closed());
        assert_eq!(queue.active_users(), 0);
        assert_eq!(queue.size(), 0);
        assert_matches!(
            queue.submit(idle_entry(1)).await,
            Err(PipelineError::QueueClosed)
        );
        assert_eq!(queue.in_flight(1), 0);
    }

    #[tokio::test]
    async fn rejection_is_broadcast() {
        let (queue, _worker) = AdmissionQueue::new(&config(1, 10)).unwrap();
        let mut events = queue.subscribe();
        queue.submit(idle_entry(3)).await.unwrap();
        let _ = queue.submit(idle_entry(3)).await;

        assert_matches!(events.recv().await, Ok(QueueEvent::Admitted { user_id: 3, .. }));
        assert_matches!(events.recv().await, Ok(QueueEvent::Rejected { user_id: 3, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_wait_for_space_leaves_no_trace() {
        let (queue, _worker) = AdmissionQueue::new(&config(4, 1)).unwrap();
        let mut events = queue.subscribe();
        queue.submit(idle_entry(1)).await.unwrap();

        let waited = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            queue.submit(idle_entry(2)),
        )
        .await;
        assert!(waited.is_err(), "submit should still be waiting for space");

        assert_eq!(queue.in_flight(2), 0);
        assert_eq!(queue.size(), 1);
        assert_eq!(queue.reported_size(), 1);
        assert_matches!(events.recv().await, Ok(QueueEvent::Admitted { user_id: 1, .. }));
        assert_matches!(events.try_recv(), Err(broadcast::error::TryRecvError::Empty));
    }

    #[test]
    fn invalid_config_is_refused() {
        assert_matches!(
            AdmissionQueue::new(&config(0, 10)).err(),
            Some(CoreError::Validation(_))
        );
    }
}
