//! # Command Dispatch
//!
//! The operations a host front-end can invoke, as a closed enum matched
//! exhaustively to handlers. Adding a command without a handler is a compile
//! error, not a runtime lookup failure.

use crate::context::ServiceContext;
use crate::error::Result;
use crate::providers::SynthesisRequest;
use crate::queue::{BatchOptions, BatchRecordingRequest, QueueStats, RecordingTaskRequest};
use crate::resilience::retry_api_call;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Every operation the core accepts from a host application
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Queue processing for a single recording
    ProcessRecording { request: RecordingTaskRequest },

    /// Queue a batch of recordings
    ProcessBatch {
        recordings: Vec<BatchRecordingRequest>,
        options: BatchOptions,
    },

    /// Best-effort cancellation of one task
    CancelTask { task_id: Uuid },

    /// Cancel every still-queued task in a batch
    CancelBatch { batch_id: Uuid },

    /// Queue-wide task counts
    QueueStats,

    /// Read a document back as synthesized speech
    SynthesizeSpeech {
        text: String,
        language: String,
        voice: String,
    },

    /// Reset all circuit breakers to closed (admin override)
    ResetBreakers,
}

/// Result of a dispatched command
#[derive(Debug)]
pub enum CommandOutcome {
    TaskQueued(Uuid),
    BatchQueued(Uuid),
    TaskCancelled(bool),
    BatchCancelled(usize),
    Stats(QueueStats),
    Audio(Vec<u8>),
    Done,
}

/// Dispatch a command against the service context.
pub async fn execute(context: &ServiceContext, command: Command) -> Result<CommandOutcome> {
    match command {
        Command::ProcessRecording { request } => {
            let task_id = context.queue.add_recording(request)?;
            Ok(CommandOutcome::TaskQueued(task_id))
        }

        Command::ProcessBatch {
            recordings,
            options,
        } => {
            let batch_id = context.queue.add_batch_recordings(recordings, options).await?;
            Ok(CommandOutcome::BatchQueued(batch_id))
        }

        Command::CancelTask { task_id } => {
            let cancelled = context.queue.cancel_task(task_id)?;
            Ok(CommandOutcome::TaskCancelled(cancelled))
        }

        Command::CancelBatch { batch_id } => {
            let cancelled = context.queue.cancel_batch(batch_id)?;
            Ok(CommandOutcome::BatchCancelled(cancelled))
        }

        Command::QueueStats => Ok(CommandOutcome::Stats(context.queue.stats())),

        Command::SynthesizeSpeech {
            text,
            language,
            voice,
        } => {
            let request = SynthesisRequest {
                text,
                language,
                voice,
            };

            let provider_name = context.providers.tts.name().to_string();
            context.limiter.acquire(&provider_name, None).await;

            let breaker = context
                .breakers
                .get_circuit_breaker("speech_synthesis")
                .await;
            let audio = retry_api_call(
                &context.retry_policy,
                "synthesize_speech",
                Some(breaker.as_ref()),
                || context.providers.tts.synthesize(&request),
            )
            .await?;

            Ok(CommandOutcome::Audio(audio))
        }

        Command::ResetBreakers => {
            context.breakers.reset_all().await;
            Ok(CommandOutcome::Done)
        }
    }
}
