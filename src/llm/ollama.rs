use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ChatMessage, GenerationRequest, Generator};
use crate::config::LlmConfig;
use crate::error::GenerationError;

pub struct OllamaGenerator {
    client: reqwest::Client,
    config: LlmConfig,
}

impl OllamaGenerator {
    pub fn new(client: reqwest::Client, config: LlmConfig) -> Self {
        Self { client, config }
    }
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    /// A JSON schema constrains the output to that shape
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a serde_json::Value>,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let url = format!("{}/api/chat", self.config.base_url);

        let req = OllamaChatRequest {
            model: &self.config.chat_model,
            messages: &request.messages,
            stream: false,
            format: request.schema.as_ref(),
            options: OllamaOptions {
                temperature: request.temperature,
            },
        };

        let resp = self
            .client
            .post(&url)
            .json(&req)
            .send()
            .await
            .map_err(|e| GenerationError::Transport(format!("Failed to call Ollama: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(GenerationError::Provider { status, body });
        }

        let body: OllamaChatResponse = resp.json().await.map_err(|e| {
            GenerationError::InvalidResponse(format!("Failed to parse Ollama response: {e}"))
        })?;
        Ok(body.message.content)
    }
}
