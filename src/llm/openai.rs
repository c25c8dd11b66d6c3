use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ChatMessage, GenerationRequest, Generator};
use crate::config::LlmConfig;
use crate::error::GenerationError;

/// Adapter for any OpenAI-compatible `/v1/chat/completions` endpoint.
pub struct OpenAiGenerator {
    client: reqwest::Client,
    config: LlmConfig,
}

impl OpenAiGenerator {
    pub fn new(client: reqwest::Client, config: LlmConfig) -> Self {
        Self { client, config }
    }
}

#[derive(Serialize)]
struct OpenAiChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat<'a>>,
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: JsonSchemaFormat<'a>,
}

#[derive(Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'a str,
    schema: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let url = format!("{}/v1/chat/completions", self.config.base_url);
        let api_key = self.config.api_key.as_deref().unwrap_or_default();

        let req = OpenAiChatRequest {
            model: &self.config.chat_model,
            messages: &request.messages,
            temperature: request.temperature,
            response_format: request.schema.as_ref().map(|schema| ResponseFormat {
                kind: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: request.label,
                    schema,
                },
            }),
        };

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&req)
            .send()
            .await
            .map_err(|e| GenerationError::Transport(format!("Failed to call OpenAI: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(GenerationError::Provider { status, body });
        }

        let body: OpenAiChatResponse = resp.json().await.map_err(|e| {
            GenerationError::InvalidResponse(format!("Failed to parse OpenAI response: {e}"))
        })?;
        Ok(body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_format_shape() {
        let messages = vec![ChatMessage::system("s"), ChatMessage::user("u")];
        let schema = serde_json::json!({"type": "object"});
        let req = OpenAiChatRequest {
            model: "gpt-4o-mini",
            messages: &messages,
            temperature: 0.0,
            response_format: Some(ResponseFormat {
                kind: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: "intent",
                    schema: &schema,
                },
            }),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["response_format"]["type"], "json_schema");
        assert_eq!(json["response_format"]["json_schema"]["name"], "intent");
    }

    #[test]
    fn test_null_content_is_empty_completion() {
        let body: OpenAiChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":null}}]}"#).unwrap();
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        assert_eq!(content, "");
    }
}
