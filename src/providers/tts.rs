//! HTTP text-to-speech provider (ElevenLabs-style synthesis endpoint).

use crate::config::ProviderEndpoint;
use crate::error::Result;
use crate::providers::{classify_error_response, with_timeout, SynthesisRequest, TtsProvider};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

pub struct HttpTtsProvider {
    endpoint: ProviderEndpoint,
    client: reqwest::Client,
    timeout: Duration,
    api_key: String,
}

impl HttpTtsProvider {
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
impl TtsProvider for HttpTtsProvider {
    fn name(&self) -> &str {
        &self.endpoint.name
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>> {
        with_timeout("speech_synthesis", self.timeout, async {
            let url = format!(
                "{}/v1/text-to-speech/{}",
                self.endpoint.base_url, request.voice
            );

            let response = self
                .client
                .post(&url)
                .header("xi-api-key", &self.api_key)
                .json(&json!({
                    "text": request.text,
                    "model_id": self.endpoint.model,
                    "language_code": request.language,
                }))
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(classify_error_response(&self.endpoint.name, response).await);
            }

            let audio = response.bytes().await?.to_vec();
            debug!(
                provider = %self.endpoint.name,
                voice = %request.voice,
                bytes = audio.len(),
                "Speech synthesis complete"
            );
            Ok(audio)
        })
        .await
    }
}
