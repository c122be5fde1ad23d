//! Gemini provider: hand-rolled `reqwest` client against the
//! `generativelanguage.googleapis.com` REST API, following the same
//! shape as a direct-HTTP provider against a JSON chat endpoint.

use crate::services::chat::{Attachment, ChatConfig, ChatService, Message, MessageRole};
use crate::shared::errors::{AppError, AppResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub struct GeminiChatService {
    client: Client,
    base_url: String,
    api_key: String,
    default_model: String,
}

impl GeminiChatService {
    pub fn new(api_key: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key: api_key.into(),
            default_model: default_model.into(),
        }
    }

    pub fn from_env() -> AppResult<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| AppError::ConfigError("GEMINI_API_KEY is not set".to_string()))?;
        let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.5-pro".to_string());
        Ok(Self::new(api_key, model))
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "systemInstruction")]
    system_instruction: Option<Content>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Deserialize)]
struct ResponseContent {
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: String,
}

#[async_trait]
impl ChatService for GeminiChatService {
    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn complete(
        &self,
        messages: &[Message],
        config: &ChatConfig,
        attachments: &[Attachment],
    ) -> AppResult<String> {
        if !attachments.is_empty() {
            tracing::debug!(count = attachments.len(), "Gemini provider does not upload file attachments");
        }

        let config = self.effective_config(config.clone());

        let system_instruction = messages
            .iter()
            .find(|m| m.role == MessageRole::System)
            .map(|m| Content { role: "user".to_string(), parts: vec![Part { text: m.content.clone() }] });

        let contents: Vec<Content> = messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .map(|m| Content {
                role: match m.role {
                    MessageRole::Assistant => "model".to_string(),
                    _ => "user".to_string(),
                },
                parts: vec![Part { text: m.content.clone() }],
            })
            .collect();

        let request = GenerateRequest {
            contents,
            system_instruction,
            generation_config: config.temperature.map(|t| GenerationConfig { temperature: Some(t) }),
        };

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, config.model, self.api_key
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::ExternalHttpError(format!("failed to reach Gemini: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::ExternalHttpError(format!("failed to read Gemini response: {e}")))?;

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::RateLimited(format!("Gemini rate limited: {body}")));
        }
        if !status.is_success() {
            return Err(AppError::ExternalHttpError(format!("Gemini API error ({status}): {body}")));
        }

        let parsed: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| AppError::ParseError(format!("failed to parse Gemini response: {e}")))?;

        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| AppError::ParseError("empty response from Gemini".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_model() {
        let svc = GeminiChatService::new("key", "gemini-2.5-pro");
        assert_eq!(svc.default_model(), "gemini-2.5-pro");
    }

    #[test]
    fn test_with_base_url() {
        let svc = GeminiChatService::new("key", "gemini-2.5-pro").with_base_url("http://localhost:9999");
        assert_eq!(svc.base_url, "http://localhost:9999");
    }
}
