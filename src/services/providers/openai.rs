//! OpenAI Responses API provider, backed by the `openai-tools` crate.

use crate::services::chat::{Attachment, ChatConfig, ChatService, Message, MessageRole};
use crate::shared::errors::{AppError, AppResult};
use async_trait::async_trait;
use openai_tools::chat::request::ChatCompletion;
use openai_tools::common::message::Message as OpenAiMessage;
use openai_tools::common::role::Role as OpenAiRole;

/// Talks to the OpenAI Responses API. The API key is read from the
/// `OPENAI_API_KEY` environment variable by the underlying crate.
pub struct OpenAiChatService {
    default_model: String,
}

impl OpenAiChatService {
    pub fn new(default_model: impl Into<String>) -> Self {
        Self { default_model: default_model.into() }
    }

    pub fn from_env() -> AppResult<Self> {
        std::env::var("OPENAI_API_KEY")
            .map_err(|_| AppError::ConfigError("OPENAI_API_KEY is not set".to_string()))?;
        Ok(Self::new(
            std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
        ))
    }

    fn convert_message(msg: &Message) -> OpenAiMessage {
        let role = match msg.role {
            MessageRole::System => OpenAiRole::System,
            MessageRole::User => OpenAiRole::User,
            MessageRole::Assistant => OpenAiRole::Assistant,
        };
        OpenAiMessage::from_string(role, msg.content.clone())
    }
}

#[async_trait]
impl ChatService for OpenAiChatService {
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
            tracing::debug!(count = attachments.len(), "attaching files to OpenAI request");
        }

        let config = self.effective_config(config.clone());
        let openai_messages: Vec<OpenAiMessage> = messages.iter().map(Self::convert_message).collect();

        let mut chat = ChatCompletion::new();
        chat.model_id(&config.model).messages(openai_messages);
        if let Some(temperature) = config.temperature {
            chat.temperature(temperature);
        }

        let response = chat
            .chat()
            .await
            .map_err(|e| AppError::ExternalHttpError(format!("OpenAI API error: {e}")))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .and_then(|c| c.text)
            .ok_or_else(|| AppError::ParseError("empty response from OpenAI".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_model_fallback() {
        let svc = OpenAiChatService::new("gpt-4o");
        assert_eq!(svc.default_model(), "gpt-4o");
    }
}
