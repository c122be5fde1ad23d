//! Codex CLI provider: shells out to a local `codex` binary in
//! non-interactive exec mode, following the subprocess-wrapper pattern
//! used elsewhere in the corpus for external command-line tools.

use crate::services::chat::{Attachment, ChatConfig, ChatService, Message, MessageRole};
use crate::shared::errors::{AppError, AppResult};
use async_trait::async_trait;
use tokio::process::Command;

pub struct CodexCliChatService {
    cli_path: String,
    default_model: String,
}

impl CodexCliChatService {
    pub fn new(cli_path: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self { cli_path: cli_path.into(), default_model: default_model.into() }
    }

    fn render_prompt(messages: &[Message]) -> String {
        messages
            .iter()
            .map(|m| {
                let label = match m.role {
                    MessageRole::System => "system",
                    MessageRole::User => "user",
                    MessageRole::Assistant => "assistant",
                };
                format!("[{label}]\n{}", m.content)
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[async_trait]
impl ChatService for CodexCliChatService {
    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn complete(
        &self,
        messages: &[Message],
        config: &ChatConfig,
        attachments: &[Attachment],
    ) -> AppResult<String> {
        let config = self.effective_config(config.clone());
        let prompt = Self::render_prompt(messages);

        let mut cmd = Command::new(&self.cli_path);
        cmd.arg("exec").arg("--model").arg(&config.model).arg("--skip-git-repo-check");
        for attachment in attachments {
            cmd.arg("--image").arg(&attachment.path);
        }
        cmd.arg(prompt);

        let output = cmd
            .output()
            .await
            .map_err(|e| AppError::ExternalHttpError(format!("failed to spawn codex CLI: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::ExternalHttpError(format!(
                "codex CLI exited with {}: {}",
                output.status, stderr
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if stdout.is_empty() {
            return Err(AppError::ParseError("empty response from codex CLI".to_string()));
        }
        Ok(stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::chat::MessageRole;

    #[test]
    fn test_render_prompt_includes_all_roles() {
        let messages = vec![
            Message { role: MessageRole::System, content: "be terse".to_string() },
            Message { role: MessageRole::User, content: "hello".to_string() },
        ];
        let rendered = CodexCliChatService::render_prompt(&messages);
        assert!(rendered.contains("[system]"));
        assert!(rendered.contains("be terse"));
        assert!(rendered.contains("[user]"));
        assert!(rendered.contains("hello"));
    }

    #[test]
    fn test_default_model() {
        let svc = CodexCliChatService::new("codex", "gpt-5-codex");
        assert_eq!(svc.default_model(), "gpt-5-codex");
    }
}
