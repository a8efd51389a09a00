//! # System Constants
//!
//! Core constants and enums that define the operational boundaries of the
//! Scribe dictation processing core.

use serde::{Deserialize, Serialize};

// Re-export state types for convenience
pub use crate::queue::states::{BatchStatus, TaskStatus};

/// Event name constants used in structured log fields and event payloads
pub mod events {
    // Task lifecycle events
    pub const TASK_ENQUEUED: &str = "task.enqueued";
    pub const TASK_STARTED: &str = "task.started";
    pub const TASK_COMPLETED: &str = "task.completed";
    pub const TASK_FAILED: &str = "task.failed";
    pub const TASK_CANCELLED: &str = "task.cancelled";

    // Batch lifecycle events
    pub const BATCH_CREATED: &str = "batch.created";
    pub const BATCH_PROGRESS: &str = "batch.progress";
    pub const BATCH_COMPLETED: &str = "batch.completed";
    pub const BATCH_CANCELLED: &str = "batch.cancelled";

    // Provider call events
    pub const PROVIDER_CALL_STARTED: &str = "provider.call_started";
    pub const PROVIDER_CALL_RETRIED: &str = "provider.call_retried";
    pub const PROVIDER_CALL_FAILED: &str = "provider.call_failed";
}

/// Clinical document kinds a task can be asked to generate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    SoapNote,
    Referral,
    Letter,
}

impl DocumentKind {
    /// Database column holding this document kind on the recordings table.
    pub fn column(&self) -> &'static str {
        match self {
            DocumentKind::SoapNote => "soap_note",
            DocumentKind::Referral => "referral",
            DocumentKind::Letter => "letter",
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentKind::SoapNote => write!(f, "soap_note"),
            DocumentKind::Referral => write!(f, "referral"),
            DocumentKind::Letter => write!(f, "letter"),
        }
    }
}

/// Task priority; the queue drains high-priority work first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    High,
    #[default]
    Normal,
}

/// System-wide constants
pub mod system {
    /// Version compatibility marker
    pub const SCRIBE_CORE_VERSION: &str = "0.1.0";

    /// Maximum number of recordings accepted in a single batch
    pub const MAX_BATCH_SIZE: usize = 100;

    /// Default worker concurrency for the processing queue
    pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

    /// Minimum interval between rate limiter state writes to disk
    pub const RATE_LIMIT_SAVE_INTERVAL_SECS: u64 = 5;

    /// Idle expiry after which per-key rate limiter entries are collected
    pub const RATE_LIMIT_IDLE_EXPIRY_SECS: u64 = 600;

    /// PID file name used for single-instance enforcement
    pub const PID_FILE_NAME: &str = "scribed.pid";
}

/// Status groupings for validation and reporting logic
pub mod status_groups {
    use crate::queue::states::TaskStatus;

    /// Statuses from which a task can still be cancelled cleanly
    pub const CANCELLABLE: &[TaskStatus] = &[TaskStatus::Queued];

    /// Terminal statuses; tasks in these states are never mutated again
    pub const TERMINAL: &[TaskStatus] = &[
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Cancelled,
    ];
}
