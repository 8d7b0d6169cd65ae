//! Job admission and execution for the generation service.
//!
//! - [`AdmissionQueue`] admits jobs subject to a per-user quota and a
//!   bounded capacity, in strict FIFO order.
//! - [`QueueWorker`] executes admitted jobs one at a time, reporting
//!   progress through a [`ProgressTicker`] while each runs.
//! - [`Processor`] adapts a [`Job`] to the queue's lifecycle callbacks.

pub mod config;
pub mod error;
pub mod events;
pub mod job;
pub mod processor;
pub mod queue;
pub mod quota;
pub mod ticker;
pub mod worker;

pub use config::QueueConfig;
pub use error::PipelineError;
pub use events::QueueEvent;
pub use job::{Job, JobKind};
pub use processor::{format_progress, JobOutcome, Processor};
pub use queue::{AdmissionQueue, ExecutionResult, QueueEntry};
pub use ticker::ProgressTicker;
pub use worker::QueueWorker;
