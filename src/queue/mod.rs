//! # Queue Module
//!
//! The asynchronous processing queue and its batch bookkeeping: task and
//! batch state machines, the worker dispatch loop, and the executor seam the
//! pipeline plugs into.

pub mod batch;
pub mod processing_queue;
pub mod states;
pub mod task;

pub use batch::{Batch, BatchOptions};
pub use processing_queue::{
    BatchRecordingRequest, ProcessingQueue, QueueStats, RecordingLookup,
};
pub use states::{BatchStatus, TaskStatus};
pub use task::{
    ProcessOptions, ProcessingTask, RecordingTaskRequest, TaskExecutor, TaskOutput, TaskSpec,
};
