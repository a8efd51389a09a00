//! # Provider Abstractions
//!
//! Object-safe traits for the three external service families the pipeline
//! calls — speech-to-text, document generation, and speech synthesis — plus
//! HTTP-backed implementations.
//!
//! The contract at this boundary: implementations normalize every transport
//! and API failure into the [`ScribeError`](crate::error::ScribeError)
//! taxonomy. Status 401/403 becomes an authentication failure, 429 becomes
//! `RateLimited` (carrying the `Retry-After` hint when the provider sends
//! one), 5xx becomes a service error, and request timeouts become `Timeout`.
//! Nothing above this layer ever sees a raw `reqwest` error.

pub mod ai;
pub mod stt;
pub mod tts;

use crate::config::{ProviderTimeoutsConfig, ProvidersConfig};
use crate::error::{Result, ScribeError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub use ai::HttpAiProvider;
pub use stt::HttpSttProvider;
pub use tts::HttpTtsProvider;

/// Request for clinical document generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub model: String,
    pub system_message: String,
    pub prompt: String,
    pub temperature: f32,
}

/// Request for audio transcription
#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    pub audio: Vec<u8>,
    pub language: Option<String>,
    pub diarize: bool,
}

/// Transcription output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub text: String,
    pub confidence: Option<f64>,
}

/// Request for speech synthesis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub text: String,
    pub language: String,
    pub voice: String,
}

/// Document generation (LLM) provider
#[async_trait]
pub trait AiProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Generate text for the request, returning the full completion.
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;

    /// Streaming variant: incremental chunks are sent on `chunks` as they
    /// arrive; the full accumulated text is returned at the end.
    async fn generate_streaming(
        &self,
        request: &GenerationRequest,
        chunks: mpsc::UnboundedSender<String>,
    ) -> Result<String>;
}

/// Speech-to-text provider
#[async_trait]
pub trait SttProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn transcribe(&self, request: &TranscriptionRequest) -> Result<TranscriptionResult>;
}

/// Text-to-speech provider
#[async_trait]
pub trait TtsProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Synthesize speech, returning encoded audio bytes.
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>>;
}

/// The configured provider for each operation family
#[derive(Clone)]
pub struct ProviderSet {
    pub stt: Arc<dyn SttProvider>,
    pub ai: Arc<dyn AiProvider>,
    pub tts: Arc<dyn TtsProvider>,
}

impl ProviderSet {
    /// Construct HTTP providers from configuration.
    pub fn from_config(config: &ProvidersConfig, timeouts: &ProviderTimeoutsConfig) -> Result<Self> {
        Ok(Self {
            stt: Arc::new(HttpSttProvider::new(
                config.transcription.clone(),
                timeouts.timeout_for(crate::config::ProviderOperation::Transcription),
            )?),
            ai: Arc::new(HttpAiProvider::new(
                config.generation.clone(),
                timeouts.timeout_for(crate::config::ProviderOperation::Generation),
            )?),
            tts: Arc::new(HttpTtsProvider::new(
                config.speech_synthesis.clone(),
                timeouts.timeout_for(crate::config::ProviderOperation::SpeechSynthesis),
            )?),
        })
    }
}

impl std::fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSet")
            .field("stt", &self.stt.name())
            .field("ai", &self.ai.name())
            .field("tts", &self.tts.name())
            .finish()
    }
}

/// Parse a `Retry-After` header value (delta-seconds form).
fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Normalize a non-success HTTP response into the error taxonomy.
pub(crate) async fn classify_error_response(
    provider: &str,
    response: reqwest::Response,
) -> ScribeError {
    let status = response.status();
    let retry_after = parse_retry_after(&response);
    let body = response.text().await.unwrap_or_default();
    let message = if body.is_empty() {
        status.to_string()
    } else {
        // Bodies can be large HTML error pages; keep logs bounded.
        body.chars().take(500).collect()
    };

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        ScribeError::AuthenticationFailed {
            provider: provider.to_string(),
            message,
        }
    } else if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        ScribeError::RateLimited {
            provider: provider.to_string(),
            retry_after,
        }
    } else if status.is_server_error() {
        ScribeError::ServiceUnavailable {
            provider: provider.to_string(),
            message,
        }
    } else {
        ScribeError::Validation(format!("{provider} rejected request ({status}): {message}"))
    }
}

/// Apply the per-operation timeout to a provider future.
pub(crate) async fn with_timeout<T>(
    operation: &str,
    timeout: Duration,
    future: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(ScribeError::Timeout {
            operation: operation.to_string(),
            timeout,
        }),
    }
}
