//! HTTP document-generation provider (OpenAI-compatible chat completions).

use crate::config::ProviderEndpoint;
use crate::error::{Result, ScribeError};
use crate::providers::{classify_error_response, with_timeout, AiProvider, GenerationRequest};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

pub struct HttpAiProvider {
    endpoint: ProviderEndpoint,
    client: reqwest::Client,
    timeout: Duration,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
}

impl HttpAiProvider {
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

    fn request_body(&self, request: &GenerationRequest, stream: bool) -> serde_json::Value {
        json!({
            "model": request.model,
            "messages": [
                {"role": "system", "content": request.system_message},
                {"role": "user", "content": request.prompt},
            ],
            "temperature": request.temperature,
            "stream": stream,
        })
    }

    async fn post_completions(
        &self,
        request: &GenerationRequest,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let url = format!("{}/v1/chat/completions", self.endpoint.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(request, stream))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(classify_error_response(&self.endpoint.name, response).await);
        }
        Ok(response)
    }
}

#[async_trait]
impl AiProvider for HttpAiProvider {
    fn name(&self) -> &str {
        &self.endpoint.name
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        with_timeout("generation", self.timeout, async {
            let response = self.post_completions(request, false).await?;
            let parsed: ChatResponse = response.json().await?;

            let text = parsed
                .choices
                .into_iter()
                .next()
                .map(|choice| choice.message.content)
                .ok_or_else(|| {
                    ScribeError::ServiceUnavailable {
                        provider: self.endpoint.name.clone(),
                        message: "empty completion response".to_string(),
                    }
                })?;

            debug!(
                provider = %self.endpoint.name,
                model = %request.model,
                chars = text.len(),
                "Generation complete"
            );
            Ok(text)
        })
        .await
    }

    async fn generate_streaming(
        &self,
        request: &GenerationRequest,
        chunks: mpsc::UnboundedSender<String>,
    ) -> Result<String> {
        with_timeout("generation", self.timeout, async {
            let response = self.post_completions(request, true).await?;

            let mut accumulated = String::new();
            let mut buffer = String::new();
            let mut stream = response.bytes_stream();

            while let Some(piece) = stream.next().await {
                let bytes = piece.map_err(ScribeError::from)?;
                buffer.push_str(&String::from_utf8_lossy(&bytes));

                // SSE frames are newline-delimited `data: {...}` lines.
                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim().to_string();
                    buffer.drain(..=newline);

                    let Some(payload) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    if payload == "[DONE]" {
                        return Ok(accumulated);
                    }

                    if let Ok(chunk) = serde_json::from_str::<StreamChunk>(payload) {
                        for choice in chunk.choices {
                            if let Some(content) = choice.delta.content {
                                accumulated.push_str(&content);
                                // Receiver dropping just means nobody is watching
                                // the stream anymore; keep accumulating.
                                let _ = chunks.send(content);
                            }
                        }
                    }
                }
            }

            Ok(accumulated)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        std::env::set_var("TEST_AI_KEY", "sk-test");
        let provider = HttpAiProvider::new(
            ProviderEndpoint {
                name: "openai".to_string(),
                base_url: "https://api.openai.com".to_string(),
                api_key_env: "TEST_AI_KEY".to_string(),
                model: "gpt-4o".to_string(),
            },
            Duration::from_secs(30),
        )
        .unwrap();

        let body = provider.request_body(
            &GenerationRequest {
                model: "gpt-4o".to_string(),
                system_message: "You are a clinical scribe".to_string(),
                prompt: "transcript".to_string(),
                temperature: 0.2,
            },
            true,
        );

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
    }

    #[test]
    fn test_missing_api_key_is_configuration_error() {
        let result = HttpAiProvider::new(
            ProviderEndpoint {
                name: "openai".to_string(),
                base_url: "https://api.openai.com".to_string(),
                api_key_env: "SCRIBE_TEST_UNSET_KEY".to_string(),
                model: "gpt-4o".to_string(),
            },
            Duration::from_secs(30),
        );
        assert!(matches!(result, Err(ScribeError::Configuration(_))));
    }
}
