//! Batch bookkeeping types.
//!
//! A batch groups the tasks created from one multi-recording submission.
//! Counters are never incremented in place: after every terminal task
//! transition they are recomputed from the authoritative per-task statuses,
//! which keeps the `completed + failed + pending == total` invariant trivially
//! true at every observation point.

use crate::constants::TaskPriority;
use crate::queue::states::BatchStatus;
use crate::queue::task::ProcessOptions;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Options applied to every task in a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOptions {
    /// Pipeline stages to run for each recording
    pub process: ProcessOptions,

    /// Skip recordings whose requested documents all already exist
    pub skip_existing: bool,

    /// Keep running sibling tasks after one fails
    pub continue_on_error: bool,

    pub priority: TaskPriority,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            process: ProcessOptions::default(),
            skip_existing: false,
            continue_on_error: true,
            priority: TaskPriority::Normal,
        }
    }
}

/// Bookkeeping state for one batch
#[derive(Debug, Clone)]
pub struct Batch {
    pub batch_id: Uuid,
    pub task_ids: Vec<Uuid>,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub pending: usize,
    pub status: BatchStatus,
    pub options: BatchOptions,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Task ids that completed successfully
    pub results: Vec<Uuid>,

    /// User-facing error strings from failed tasks
    pub errors: Vec<String>,

    /// Set once `cancel_batch` has been called
    pub cancel_requested: bool,

    /// Recording ids dropped by skip-existing filtering
    pub skipped_recordings: Vec<i64>,
}

impl Batch {
    pub fn new(batch_id: Uuid, task_ids: Vec<Uuid>, options: BatchOptions) -> Self {
        let total = task_ids.len();
        Self {
            batch_id,
            task_ids,
            total,
            completed: 0,
            failed: 0,
            pending: total,
            status: BatchStatus::Processing,
            options,
            created_at: Utc::now(),
            completed_at: None,
            results: Vec::new(),
            errors: Vec::new(),
            cancel_requested: false,
            skipped_recordings: Vec::new(),
        }
    }

    /// The structural invariant maintained by every recount.
    pub fn invariant_holds(&self) -> bool {
        self.completed + self.failed + self.pending == self.total
    }

    /// Summary in the `N successful, M failed` form surfaced to users.
    pub fn summary(&self) -> String {
        format!("{} successful, {} failed", self.completed, self.failed)
    }
}
