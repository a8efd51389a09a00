//! Task types for the processing queue.

use crate::constants::{DocumentKind, TaskPriority};
use crate::error::{Result, ScribeError};
use crate::queue::states::TaskStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Which pipeline stages a task should run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProcessOptions {
    pub generate_soap: bool,
    pub generate_referral: bool,
    pub generate_letter: bool,

    /// Request speaker diarization from the STT provider
    pub diarize: bool,

    /// Transcription language hint (provider default when absent)
    pub language: Option<String>,
}

impl ProcessOptions {
    /// Document kinds requested, in generation order.
    pub fn requested_documents(&self) -> Vec<DocumentKind> {
        let mut kinds = Vec::new();
        if self.generate_soap {
            kinds.push(DocumentKind::SoapNote);
        }
        if self.generate_referral {
            kinds.push(DocumentKind::Referral);
        }
        if self.generate_letter {
            kinds.push(DocumentKind::Letter);
        }
        kinds
    }
}

/// Immutable description of one unit of work, handed to the executor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub task_id: Uuid,
    pub recording_id: i64,
    pub file_path: String,
    pub options: ProcessOptions,
    pub priority: TaskPriority,
    pub batch_id: Option<Uuid>,
}

/// Output of a completed task
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskOutput {
    /// Transcript produced (or reused) by the pipeline
    pub transcript: Option<String>,

    /// Generated documents by kind
    pub documents: HashMap<DocumentKind, String>,
}

/// Registry entry for a task, owned by the queue until terminal
#[derive(Debug, Clone)]
pub struct ProcessingTask {
    pub spec: TaskSpec,
    pub status: TaskStatus,
    pub result: Option<TaskOutput>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ProcessingTask {
    pub fn new(spec: TaskSpec) -> Self {
        Self {
            spec,
            status: TaskStatus::Queued,
            result: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Request to enqueue processing for one recording
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingTaskRequest {
    pub recording_id: i64,
    pub file_path: String,
    pub options: ProcessOptions,
    pub priority: TaskPriority,
}

impl RecordingTaskRequest {
    pub fn validate(&self) -> Result<()> {
        if self.file_path.trim().is_empty() {
            return Err(ScribeError::Validation(
                "Recording file path must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Executes the pipeline for one task. The production implementation calls
/// STT and generation providers; tests substitute deterministic executors.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, spec: &TaskSpec) -> Result<TaskOutput>;
}
