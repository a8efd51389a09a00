//! # Processing Queue
//!
//! Bounded asynchronous queue executing transcription/generation tasks on a
//! tokio worker pool. The caller-facing API (`add_recording`,
//! `add_batch_recordings`, `cancel_task`, `cancel_batch`) is non-blocking and
//! returns identifiers immediately; progress is reported through the event
//! channel.
//!
//! ## Lock discipline
//!
//! Task and batch state live in concurrent maps. A task entry guard is never
//! held across a batch entry acquisition, and batch recounts read task
//! statuses only through short-lived shared guards, so the two maps cannot
//! deadlock against each other. Events are always emitted after every guard
//! has been released.
//!
//! ## Cancellation
//!
//! Cooperative and best-effort: only still-queued tasks can be cancelled.
//! A cancelled task remains in the channel; the worker that eventually
//! dequeues it observes the terminal status and skips execution.

use crate::config::QueueConfig;
use crate::constants::TaskPriority;
use crate::error::{Result, ScribeError};
use crate::events::{EventSender, ProcessingEvent};
use crate::logging::{log_batch_operation, log_task_operation};
use crate::models::Recording;
use crate::queue::batch::{Batch, BatchOptions};
use crate::queue::states::{BatchStatus, TaskStatus};
use crate::queue::task::{
    ProcessingTask, RecordingTaskRequest, TaskExecutor, TaskSpec,
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Read access to stored recordings, needed for skip-existing filtering.
/// The production implementation is
/// [`RecordingStore`](crate::database::RecordingStore).
#[async_trait]
pub trait RecordingLookup: Send + Sync {
    async fn find(&self, recording_id: i64) -> Result<Recording>;
}

/// One recording submitted as part of a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRecordingRequest {
    pub recording_id: i64,
    pub file_path: String,
}

/// Snapshot of queue-wide task counts
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub queued: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

struct QueueInner {
    config: QueueConfig,
    executor: Arc<dyn TaskExecutor>,
    lookup: Arc<dyn RecordingLookup>,
    events: EventSender,
    tasks: DashMap<Uuid, ProcessingTask>,
    batches: DashMap<Uuid, Batch>,
    high_tx: mpsc::UnboundedSender<Uuid>,
    normal_tx: mpsc::UnboundedSender<Uuid>,
    semaphore: Arc<Semaphore>,
    shutdown_tx: watch::Sender<bool>,
}

/// Thread-pool-backed task queue with batch bookkeeping
pub struct ProcessingQueue {
    inner: Arc<QueueInner>,
    receivers: parking_lot::Mutex<Option<Receivers>>,
    dispatcher: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

struct Receivers {
    high_rx: mpsc::UnboundedReceiver<Uuid>,
    normal_rx: mpsc::UnboundedReceiver<Uuid>,
}

impl ProcessingQueue {
    pub fn new(
        config: QueueConfig,
        executor: Arc<dyn TaskExecutor>,
        lookup: Arc<dyn RecordingLookup>,
        events: EventSender,
    ) -> Self {
        let (high_tx, high_rx) = mpsc::unbounded_channel();
        let (normal_tx, normal_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = watch::channel(false);
        let semaphore = Arc::new(Semaphore::new(config.max_concurrency));

        let inner = Arc::new(QueueInner {
            config,
            executor,
            lookup,
            events,
            tasks: DashMap::new(),
            batches: DashMap::new(),
            high_tx,
            normal_tx,
            semaphore,
            shutdown_tx,
        });

        Self {
            inner,
            receivers: parking_lot::Mutex::new(Some(Receivers { high_rx, normal_rx })),
            dispatcher: parking_lot::Mutex::new(None),
        }
    }

    /// Start the dispatch loop. Idempotent; the second call is a no-op.
    pub fn start(&self) {
        let Some(receivers) = self.receivers.lock().take() else {
            return;
        };

        let inner = Arc::clone(&self.inner);
        let shutdown_rx = self.inner.shutdown_tx.subscribe();
        let handle = tokio::spawn(dispatch_loop(inner, receivers, shutdown_rx));
        *self.dispatcher.lock() = Some(handle);

        info!(
            max_concurrency = self.inner.config.max_concurrency,
            "Processing queue started"
        );
    }

    /// Enqueue a single recording. Non-blocking; returns the task id.
    pub fn add_recording(&self, request: RecordingTaskRequest) -> Result<Uuid> {
        request.validate()?;

        let task_id = Uuid::new_v4();
        let spec = TaskSpec {
            task_id,
            recording_id: request.recording_id,
            file_path: request.file_path,
            options: request.options,
            priority: request.priority,
            batch_id: None,
        };

        self.enqueue_task(spec)?;
        Ok(task_id)
    }

    /// Enqueue one task per recording under a shared batch id. Validates
    /// batch size, applies skip-existing filtering, and returns immediately
    /// after the tasks are queued.
    pub async fn add_batch_recordings(
        &self,
        recordings: Vec<BatchRecordingRequest>,
        options: BatchOptions,
    ) -> Result<Uuid> {
        if recordings.is_empty() {
            return Err(ScribeError::Validation(
                "Batch contains no recordings".to_string(),
            ));
        }
        if recordings.len() > self.inner.config.max_batch_size {
            return Err(ScribeError::Validation(format!(
                "Batch size {} exceeds the maximum of {}",
                recordings.len(),
                self.inner.config.max_batch_size
            )));
        }

        let mut to_enqueue = Vec::with_capacity(recordings.len());
        let mut skipped = Vec::new();

        for recording in recordings {
            if options.skip_existing && self.already_satisfied(&recording, &options).await {
                debug!(
                    recording_id = recording.recording_id,
                    "Skipping recording with existing documents"
                );
                skipped.push(recording.recording_id);
                continue;
            }
            to_enqueue.push(recording);
        }

        if to_enqueue.is_empty() {
            return Err(ScribeError::Validation(
                "Every recording in the batch already has the requested documents".to_string(),
            ));
        }

        let batch_id = Uuid::new_v4();
        let mut task_ids = Vec::with_capacity(to_enqueue.len());
        let mut specs = Vec::with_capacity(to_enqueue.len());

        for recording in to_enqueue {
            let task_id = Uuid::new_v4();
            task_ids.push(task_id);
            specs.push(TaskSpec {
                task_id,
                recording_id: recording.recording_id,
                file_path: recording.file_path,
                options: options.process.clone(),
                priority: options.priority,
                batch_id: Some(batch_id),
            });
        }

        let mut batch = Batch::new(batch_id, task_ids, options);
        batch.skipped_recordings = skipped;
        let total = batch.total;
        self.inner.batches.insert(batch_id, batch);

        // Batch entry exists before any task can finish, so the first
        // recount always finds it.
        for spec in specs {
            self.enqueue_task(spec)?;
        }

        log_batch_operation(
            crate::constants::events::BATCH_CREATED,
            Some(&batch_id.to_string()),
            Some(total),
            None,
            None,
            None,
        );

        let _ = self.inner.events.send(ProcessingEvent::BatchProgress {
            batch_id,
            total,
            completed: 0,
            failed: 0,
            pending: total,
        });

        Ok(batch_id)
    }

    /// Whether every artifact requested by the batch already exists for a
    /// recording. Lookup failures are treated as "not satisfied" so the
    /// pipeline surfaces the real error.
    async fn already_satisfied(
        &self,
        recording: &BatchRecordingRequest,
        options: &BatchOptions,
    ) -> bool {
        let Ok(row) = self.inner.lookup.find(recording.recording_id).await else {
            return false;
        };

        let requested = options.process.requested_documents();
        if requested.is_empty() {
            row.has_transcript()
        } else {
            requested.iter().all(|kind| row.has_document(*kind))
        }
    }

    fn enqueue_task(&self, spec: TaskSpec) -> Result<()> {
        let task_id = spec.task_id;
        let recording_id = spec.recording_id;
        let priority = spec.priority;

        self.inner.tasks.insert(task_id, ProcessingTask::new(spec));

        let tx = match priority {
            TaskPriority::High => &self.inner.high_tx,
            TaskPriority::Normal => &self.inner.normal_tx,
        };
        tx.send(task_id)
            .map_err(|_| ScribeError::Queue("Processing queue is shut down".to_string()))?;

        log_task_operation(
            crate::constants::events::TASK_ENQUEUED,
            Some(&task_id.to_string()),
            Some(recording_id),
            "queued",
            None,
        );
        Ok(())
    }

    /// Best-effort cancellation. Returns `true` only when the task was still
    /// queued; active tasks run to completion.
    pub fn cancel_task(&self, task_id: Uuid) -> Result<bool> {
        if !self.inner.tasks.contains_key(&task_id) {
            return Err(ScribeError::TaskNotFound { task_id });
        }

        match cancel_task_core(&self.inner, task_id) {
            Some(batch_id) => {
                let _ = self.inner.events.send(ProcessingEvent::TaskCancelled {
                    task_id,
                    batch_id,
                });
                if let Some(batch_id) = batch_id {
                    emit_recount(&self.inner, batch_id);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Cancel every still-queued task in a batch. Returns the number of
    /// tasks actually cancelled.
    pub fn cancel_batch(&self, batch_id: Uuid) -> Result<usize> {
        let task_ids = {
            let mut batch = self
                .inner
                .batches
                .get_mut(&batch_id)
                .ok_or(ScribeError::BatchNotFound { batch_id })?;
            batch.cancel_requested = true;
            batch.task_ids.clone()
        };

        let mut cancelled = 0usize;
        for task_id in task_ids {
            if let Some(_batch) = cancel_task_core(&self.inner, task_id) {
                cancelled += 1;
                let _ = self.inner.events.send(ProcessingEvent::TaskCancelled {
                    task_id,
                    batch_id: Some(batch_id),
                });
            }
        }

        log_batch_operation(
            crate::constants::events::BATCH_CANCELLED,
            Some(&batch_id.to_string()),
            None,
            None,
            None,
            Some(&format!("{cancelled} tasks cancelled")),
        );

        emit_recount(&self.inner, batch_id);
        Ok(cancelled)
    }

    /// Snapshot of a task's current state.
    pub fn get_task(&self, task_id: Uuid) -> Option<ProcessingTask> {
        self.inner.tasks.get(&task_id).map(|entry| entry.clone())
    }

    /// Snapshot of a batch's current state.
    pub fn get_batch(&self, batch_id: Uuid) -> Option<Batch> {
        self.inner.batches.get(&batch_id).map(|entry| entry.clone())
    }

    /// Queue-wide task counts by status.
    pub fn stats(&self) -> QueueStats {
        let mut stats = QueueStats::default();
        for entry in self.inner.tasks.iter() {
            match entry.status {
                TaskStatus::Queued => stats.queued += 1,
                TaskStatus::Active => stats.active += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    /// Stop the dispatcher and wait for in-flight tasks to finish.
    pub async fn shutdown(&self) {
        let _ = self.inner.shutdown_tx.send(true);

        let handle = self.dispatcher.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        // Every worker holds a permit while executing; acquiring the full
        // pool means the in-flight tasks have drained.
        let max = self.inner.config.max_concurrency as u32;
        let _drain = self.inner.semaphore.acquire_many(max).await;

        info!("Processing queue shut down");
    }
}

async fn dispatch_loop(
    inner: Arc<QueueInner>,
    mut receivers: Receivers,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }

            maybe_id = receivers.high_rx.recv() => {
                match maybe_id {
                    Some(task_id) => launch_task(&inner, task_id).await,
                    None => break,
                }
            }

            maybe_id = receivers.normal_rx.recv() => {
                match maybe_id {
                    Some(task_id) => launch_task(&inner, task_id).await,
                    None => break,
                }
            }
        }
    }

    debug!("Dispatch loop exited");
}

async fn launch_task(inner: &Arc<QueueInner>, task_id: Uuid) {
    let Ok(permit) = Arc::clone(&inner.semaphore).acquire_owned().await else {
        return;
    };

    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        run_task(inner, task_id).await;
        drop(permit);
    });
}

async fn run_task(inner: Arc<QueueInner>, task_id: Uuid) {
    // Claim: only still-queued tasks execute; a task cancelled while waiting
    // in the channel is skipped here.
    let spec = {
        let Some(mut entry) = inner.tasks.get_mut(&task_id) else {
            return;
        };
        if entry.status != TaskStatus::Queued {
            return;
        }
        entry.status = TaskStatus::Active;
        entry.spec.clone()
    };

    let _ = inner.events.send(ProcessingEvent::TaskStarted {
        task_id,
        recording_id: spec.recording_id,
    });
    log_task_operation(
        crate::constants::events::TASK_STARTED,
        Some(&task_id.to_string()),
        Some(spec.recording_id),
        "active",
        None,
    );

    let outcome = inner.executor.execute(&spec).await;

    let failure = {
        let Some(mut entry) = inner.tasks.get_mut(&task_id) else {
            return;
        };
        entry.completed_at = Some(Utc::now());
        match outcome {
            Ok(output) => {
                entry.status = TaskStatus::Completed;
                entry.result = Some(output);
                None
            }
            Err(err) => {
                let message = err.user_facing();
                entry.status = TaskStatus::Failed;
                entry.error = Some(message.clone());
                Some(message)
            }
        }
    };

    match &failure {
        None => {
            let _ = inner.events.send(ProcessingEvent::TaskCompleted {
                task_id,
                recording_id: spec.recording_id,
                batch_id: spec.batch_id,
            });
            log_task_operation(
                crate::constants::events::TASK_COMPLETED,
                Some(&task_id.to_string()),
                Some(spec.recording_id),
                "completed",
                None,
            );
        }
        Some(message) => {
            let _ = inner.events.send(ProcessingEvent::TaskFailed {
                task_id,
                recording_id: spec.recording_id,
                batch_id: spec.batch_id,
                error: message.clone(),
            });
            log_task_operation(
                crate::constants::events::TASK_FAILED,
                Some(&task_id.to_string()),
                Some(spec.recording_id),
                "failed",
                Some(message),
            );
        }
    }

    let Some(batch_id) = spec.batch_id else {
        return;
    };

    // A failure with continue_on_error=false takes the rest of the batch
    // down with it, but only tasks that have not started yet.
    if failure.is_some() && !batch_continues_on_error(&inner, batch_id) {
        cancel_queued_siblings(&inner, batch_id, task_id);
    }

    emit_recount(&inner, batch_id);
}

fn batch_continues_on_error(inner: &Arc<QueueInner>, batch_id: Uuid) -> bool {
    inner
        .batches
        .get(&batch_id)
        .map(|batch| batch.options.continue_on_error)
        .unwrap_or(true)
}

fn cancel_queued_siblings(inner: &Arc<QueueInner>, batch_id: Uuid, failed_task: Uuid) {
    let task_ids = match inner.batches.get(&batch_id) {
        Some(batch) => batch.task_ids.clone(),
        None => return,
    };

    let mut cancelled = 0usize;
    for task_id in task_ids {
        if task_id == failed_task {
            continue;
        }
        if cancel_task_core(inner, task_id).is_some() {
            cancelled += 1;
            let _ = inner.events.send(ProcessingEvent::TaskCancelled {
                task_id,
                batch_id: Some(batch_id),
            });
        }
    }

    if cancelled > 0 {
        warn!(
            batch_id = %batch_id,
            cancelled = cancelled,
            "Batch halted after task failure (continue_on_error=false)"
        );
    }
}

/// Transition a task to cancelled if it is still queued. Returns the task's
/// batch id wrapper on success (`Some(None)` for standalone tasks). Never
/// touches batch state; callers recount afterwards.
fn cancel_task_core(inner: &Arc<QueueInner>, task_id: Uuid) -> Option<Option<Uuid>> {
    let mut entry = inner.tasks.get_mut(&task_id)?;
    if !entry.status.is_cancellable() {
        return None;
    }

    entry.status = TaskStatus::Cancelled;
    entry.completed_at = Some(Utc::now());
    let batch_id = entry.spec.batch_id;
    drop(entry);

    log_task_operation(
        crate::constants::events::TASK_CANCELLED,
        Some(&task_id.to_string()),
        None,
        "cancelled",
        None,
    );
    Some(batch_id)
}

/// Recompute batch counters from authoritative task statuses and emit the
/// resulting progress (and possibly completion) events outside the lock.
fn emit_recount(inner: &Arc<QueueInner>, batch_id: Uuid) {
    let events = recount_batch(inner, batch_id);
    for event in events {
        let _ = inner.events.send(event);
    }
}

fn recount_batch(inner: &Arc<QueueInner>, batch_id: Uuid) -> Vec<ProcessingEvent> {
    let Some(mut batch) = inner.batches.get_mut(&batch_id) else {
        return Vec::new();
    };

    // Terminal batches are immutable.
    if batch.status.is_terminal() {
        return Vec::new();
    }

    let mut completed = 0usize;
    let mut failed = 0usize;
    let mut cancelled = 0usize;
    let mut pending = 0usize;
    let mut results = Vec::new();
    let mut errors = Vec::new();

    for task_id in &batch.task_ids {
        match inner.tasks.get(task_id) {
            Some(task) => match task.status {
                TaskStatus::Completed => {
                    completed += 1;
                    results.push(*task_id);
                }
                TaskStatus::Failed => {
                    failed += 1;
                    if let Some(error) = &task.error {
                        errors.push(error.clone());
                    }
                }
                TaskStatus::Cancelled => cancelled += 1,
                TaskStatus::Queued | TaskStatus::Active => pending += 1,
            },
            None => pending += 1,
        }
    }

    batch.completed = completed;
    // Cancelled tasks count as failed work for the invariant; the errors
    // list carries only genuine failures.
    batch.failed = failed + cancelled;
    batch.pending = pending;
    batch.results = results;
    batch.errors = errors;

    debug_assert!(batch.invariant_holds());

    let mut events = vec![ProcessingEvent::BatchProgress {
        batch_id,
        total: batch.total,
        completed: batch.completed,
        failed: batch.failed,
        pending: batch.pending,
    }];

    if pending == 0 {
        batch.status = if batch.cancel_requested && cancelled > 0 {
            BatchStatus::Cancelled
        } else if batch.failed == 0 {
            BatchStatus::Completed
        } else {
            BatchStatus::CompletedWithErrors
        };
        batch.completed_at = Some(Utc::now());

        log_batch_operation(
            crate::constants::events::BATCH_COMPLETED,
            Some(&batch_id.to_string()),
            Some(batch.total),
            Some(batch.completed),
            Some(batch.failed),
            Some(&batch.summary()),
        );

        events.push(ProcessingEvent::BatchCompleted {
            batch_id,
            status: batch.status,
            completed: batch.completed,
            failed: batch.failed,
        });
    }

    events
}
