//! # Processing Pipeline
//!
//! The production [`TaskExecutor`]: transcribe the recording (reusing an
//! existing transcript when present), generate each requested clinical
//! document, and persist results as they land. Every provider call goes
//! through the rate limiter, the per-component circuit breaker, and the
//! retry policy, in that order.

use crate::constants::DocumentKind;
use crate::database::RecordingStore;
use crate::error::{Result, ScribeError};
use crate::providers::{GenerationRequest, ProviderSet, TranscriptionRequest};
use crate::queue::{TaskExecutor, TaskOutput, TaskSpec};
use crate::resilience::{retry_api_call, CircuitBreakerManager, RateLimiter, RetryPolicy};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Generation temperature for clinical documents; kept low for consistency.
const GENERATION_TEMPERATURE: f32 = 0.3;

/// System messages steering each document kind
fn system_message_for(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::SoapNote => {
            "You are a clinical documentation assistant. Convert the dictated \
             transcript into a SOAP note with Subjective, Objective, Assessment, \
             and Plan sections. Use only information present in the transcript."
        }
        DocumentKind::Referral => {
            "You are a clinical documentation assistant. Draft a referral letter \
             to the relevant specialist based on the dictated transcript. Include \
             reason for referral, relevant history, and current findings."
        }
        DocumentKind::Letter => {
            "You are a clinical documentation assistant. Draft a letter to the \
             patient summarizing the visit described in the dictated transcript \
             in plain, non-technical language."
        }
    }
}

/// Production pipeline executor
pub struct PipelineExecutor {
    providers: ProviderSet,
    store: RecordingStore,
    limiter: Arc<RateLimiter>,
    breakers: CircuitBreakerManager,
    retry_policy: RetryPolicy,
    generation_model: String,
}

impl PipelineExecutor {
    pub fn new(
        providers: ProviderSet,
        store: RecordingStore,
        limiter: Arc<RateLimiter>,
        breakers: CircuitBreakerManager,
        retry_policy: RetryPolicy,
        generation_model: String,
    ) -> Self {
        Self {
            providers,
            store,
            limiter,
            breakers,
            retry_policy,
            generation_model,
        }
    }

    async fn obtain_transcript(&self, spec: &TaskSpec) -> Result<String> {
        let recording = self.store.find_by_id(spec.recording_id).await?;

        if let Some(existing) = recording.transcript.as_deref() {
            if !existing.trim().is_empty() {
                debug!(
                    recording_id = spec.recording_id,
                    "Reusing existing transcript"
                );
                return Ok(existing.to_string());
            }
        }

        let audio = tokio::fs::read(&spec.file_path).await.map_err(|err| {
            ScribeError::Validation(format!(
                "Cannot read audio file {}: {err}",
                spec.file_path
            ))
        })?;

        let request = TranscriptionRequest {
            audio,
            language: spec.options.language.clone(),
            diarize: spec.options.diarize,
        };

        let provider_name = self.providers.stt.name().to_string();
        self.limiter.acquire(&provider_name, None).await;

        let breaker = self.breakers.get_circuit_breaker("transcription").await;
        let result = retry_api_call(&self.retry_policy, "transcribe", Some(breaker.as_ref()), || {
            self.providers.stt.transcribe(&request)
        })
        .await?;

        self.store
            .update_transcript(spec.recording_id, &result.text)
            .await?;

        info!(
            recording_id = spec.recording_id,
            provider = %provider_name,
            chars = result.text.len(),
            "Transcription stored"
        );
        Ok(result.text)
    }

    async fn generate_document(
        &self,
        spec: &TaskSpec,
        kind: DocumentKind,
        transcript: &str,
    ) -> Result<String> {
        let request = GenerationRequest {
            model: self.generation_model.clone(),
            system_message: system_message_for(kind).to_string(),
            prompt: transcript.to_string(),
            temperature: GENERATION_TEMPERATURE,
        };

        let provider_name = self.providers.ai.name().to_string();
        self.limiter.acquire(&provider_name, None).await;

        let breaker = self.breakers.get_circuit_breaker("generation").await;
        let text = retry_api_call(
            &self.retry_policy,
            "generate_document",
            Some(breaker.as_ref()),
            || self.providers.ai.generate(&request),
        )
        .await?;

        self.store
            .update_document(spec.recording_id, kind, &text)
            .await?;

        info!(
            recording_id = spec.recording_id,
            document = %kind,
            chars = text.len(),
            "Document stored"
        );
        Ok(text)
    }

    async fn run_pipeline(&self, spec: &TaskSpec) -> Result<TaskOutput> {
        self.store
            .set_processing_status(spec.recording_id, "processing")
            .await?;

        let transcript = self.obtain_transcript(spec).await?;

        let mut output = TaskOutput {
            transcript: Some(transcript.clone()),
            ..Default::default()
        };

        for kind in spec.options.requested_documents() {
            let text = self.generate_document(spec, kind, &transcript).await?;
            output.documents.insert(kind, text);
        }

        self.store
            .set_processing_status(spec.recording_id, "completed")
            .await?;
        self.store
            .set_error_message(spec.recording_id, None)
            .await?;

        Ok(output)
    }
}

#[async_trait]
impl TaskExecutor for PipelineExecutor {
    async fn execute(&self, spec: &TaskSpec) -> Result<TaskOutput> {
        match self.run_pipeline(spec).await {
            Ok(output) => Ok(output),
            Err(err) => {
                // Best effort; the original error is what the caller needs.
                let _ = self
                    .store
                    .set_processing_status(spec.recording_id, "failed")
                    .await;
                let _ = self
                    .store
                    .set_error_message(spec.recording_id, Some(&err.user_facing()))
                    .await;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_messages_are_distinct() {
        let soap = system_message_for(DocumentKind::SoapNote);
        let referral = system_message_for(DocumentKind::Referral);
        let letter = system_message_for(DocumentKind::Letter);

        assert!(soap.contains("SOAP"));
        assert!(referral.contains("referral"));
        assert!(letter.contains("patient"));
        assert_ne!(soap, referral);
        assert_ne!(referral, letter);
    }
}
