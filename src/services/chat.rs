//! `ChatService`: the capability every pipeline stage uses to talk to an
//! LLM. Out of scope per the purpose statement — providers are thin,
//! concrete implementations behind this trait.

use crate::shared::errors::{AppError, AppResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: MessageRole::System, content: content.into() }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: MessageRole::User, content: content.into() }
    }
}

/// An opaque attachment reference, e.g. a path to a PDF to upload
/// alongside a prompt for providers that support file input.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub path: std::path::PathBuf,
}

#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub model: String,
    pub temperature: Option<f32>,
    pub reasoning_effort: Option<String>,
    /// Enable the provider's web-search tool, used by the Criteria
    /// stage's research phase.
    pub enable_web_search: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            temperature: None,
            reasoning_effort: None,
            enable_web_search: false,
        }
    }
}

/// The capability abstracting over OpenAI / Gemini / Codex CLI.
#[async_trait]
pub trait ChatService: Send + Sync {
    /// The provider's default model name, used when `ChatConfig::model`
    /// is empty.
    fn default_model(&self) -> &str;

    /// Issue a chat completion, optionally with file attachments.
    async fn complete(
        &self,
        messages: &[Message],
        config: &ChatConfig,
        attachments: &[Attachment],
    ) -> AppResult<String>;

    fn effective_config(&self, mut config: ChatConfig) -> ChatConfig {
        if config.model.is_empty() {
            config.model = self.default_model().to_string();
        }
        config
    }

    /// Call `complete` and parse the response as JSON, tolerating
    /// markdown code-fenced responses (` ```json ... ``` `), which every
    /// provider in this stack occasionally emits despite a JSON-only
    /// instruction.
    async fn complete_json(
        &self,
        messages: &[Message],
        config: &ChatConfig,
        attachments: &[Attachment],
    ) -> AppResult<serde_json::Value> {
        let raw = self.complete(messages, config, attachments).await?;
        parse_json_response(&raw)
    }
}

/// Extract a JSON value from an LLM response that may be a bare JSON
/// document, a fenced ` ```json ... ``` ` block, or JSON embedded in
/// surrounding prose.
pub fn parse_json_response(raw: &str) -> AppResult<serde_json::Value> {
    let trimmed = raw.trim();

    if let Ok(v) = serde_json::from_str(trimmed) {
        return Ok(v);
    }

    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        let after_lang = after_fence.strip_prefix("json").unwrap_or(after_fence);
        if let Some(end) = after_lang.find("```") {
            let candidate = after_lang[..end].trim();
            if let Ok(v) = serde_json::from_str(candidate) {
                return Ok(v);
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if end > start {
            let candidate = &trimmed[start..=end];
            if let Ok(v) = serde_json::from_str(candidate) {
                return Ok(v);
            }
        }
    }

    Err(AppError::ParseError(format!(
        "could not extract JSON from LLM response: {trimmed}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_response_bare() {
        let v = parse_json_response(r#"{"decision":"yes"}"#).unwrap();
        assert_eq!(v["decision"], "yes");
    }

    #[test]
    fn test_parse_json_response_code_block() {
        let raw = "Here is my answer:\n```json\n{\"decision\": \"no\"}\n```\n";
        let v = parse_json_response(raw).unwrap();
        assert_eq!(v["decision"], "no");
    }

    #[test]
    fn test_parse_json_response_embedded_in_prose() {
        let raw = "Sure, the result is {\"decision\": \"yes\", \"confidence\": 0.9} as requested.";
        let v = parse_json_response(raw).unwrap();
        assert_eq!(v["decision"], "yes");
    }

    #[test]
    fn test_parse_json_response_unparseable_is_error() {
        assert!(parse_json_response("not json at all").is_err());
    }
}
