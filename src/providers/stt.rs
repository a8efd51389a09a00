//! HTTP speech-to-text provider (Deepgram-style prerecorded endpoint).

use crate::config::ProviderEndpoint;
use crate::error::{Result, ScribeError};
use crate::providers::{
    classify_error_response, with_timeout, SttProvider, TranscriptionRequest, TranscriptionResult,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub struct HttpSttProvider {
    endpoint: ProviderEndpoint,
    client: reqwest::Client,
    timeout: Duration,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ListenResponse {
    results: ListenResults,
}

#[derive(Debug, Deserialize)]
struct ListenResults {
    channels: Vec<ListenChannel>,
}

#[derive(Debug, Deserialize)]
struct ListenChannel {
    alternatives: Vec<ListenAlternative>,
}

#[derive(Debug, Deserialize)]
struct ListenAlternative {
    transcript: String,
    confidence: Option<f64>,
}

impl HttpSttProvider {
    pub fn new(endpoint: ProviderEndpoint, timeout: Duration) -> Result<Self> {
        let api_key = endpoint.api_key()?;
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            endpoint,
            client,
            timeout,
            api_key,
        })
    }
}

#[async_trait]
impl SttProvider for HttpSttProvider {
    fn name(&self) -> &str {
        &self.endpoint.name
    }

    async fn transcribe(&self, request: &TranscriptionRequest) -> Result<TranscriptionResult> {
        with_timeout("transcription", self.timeout, async {
            let mut url = format!(
                "{}/v1/listen?model={}&smart_format=true",
                self.endpoint.base_url, self.endpoint.model
            );
            if request.diarize {
                url.push_str("&diarize=true");
            }
            if let Some(language) = &request.language {
                url.push_str(&format!("&language={language}"));
            }

            let response = self
                .client
                .post(&url)
                .header("Authorization", format!("Token {}", self.api_key))
                .header("Content-Type", "audio/wav")
                .body(request.audio.clone())
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(classify_error_response(&self.endpoint.name, response).await);
            }

            let parsed: ListenResponse = response.json().await?;
            let alternative = parsed
                .results
                .channels
                .into_iter()
                .next()
                .and_then(|channel| channel.alternatives.into_iter().next())
                .ok_or_else(|| ScribeError::ServiceUnavailable {
                    provider: self.endpoint.name.clone(),
                    message: "empty transcription response".to_string(),
                })?;

            debug!(
                provider = %self.endpoint.name,
                chars = alternative.transcript.len(),
                confidence = alternative.confidence,
                "Transcription complete"
            );

            Ok(TranscriptionResult {
                text: alternative.transcript,
                confidence: alternative.confidence,
            })
        })
        .await
    }
}
