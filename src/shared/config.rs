//! Process configuration, loaded from the environment.

use crate::shared::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Which `ChatService` backend to use. Spec names exactly three:
/// the OpenAI Responses API, Gemini, and a local Codex CLI subprocess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderType {
    #[default]
    OpenAi,
    Gemini,
    CodexCli,
}

impl std::fmt::Display for LlmProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmProviderType::OpenAi => write!(f, "openai"),
            LlmProviderType::Gemini => write!(f, "gemini"),
            LlmProviderType::CodexCli => write!(f, "codex-cli"),
        }
    }
}

impl std::str::FromStr for LlmProviderType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai" => Ok(LlmProviderType::OpenAi),
            "gemini" => Ok(LlmProviderType::Gemini),
            "codex-cli" | "codex_cli" | "codex" => Ok(LlmProviderType::CodexCli),
            other => Err(AppError::ConfigError(format!(
                "unknown LLM provider: {other}. valid options: openai, gemini, codex-cli"
            ))),
        }
    }
}

/// Process-wide configuration, assembled once at startup from the
/// environment (after `.env` has been loaded by the CLI entry point).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub semantic_scholar_api_key: Option<String>,
    pub openalex_email: Option<String>,

    pub openai_api_key: Option<String>,
    pub openai_model: Option<String>,

    pub gemini_api_key: Option<String>,
    pub gemini_model: Option<String>,

    pub codex_cli_path: String,

    pub default_llm_provider: LlmProviderType,
    pub default_model: Option<String>,

    pub retry_count: u32,
    pub retry_wait_time: u64,

    pub workspace_root: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            semantic_scholar_api_key: None,
            openalex_email: None,
            openai_api_key: None,
            openai_model: None,
            gemini_api_key: None,
            gemini_model: None,
            codex_cli_path: "codex".to_string(),
            default_llm_provider: LlmProviderType::default(),
            default_model: None,
            retry_count: 3,
            retry_wait_time: 1,
            workspace_root: "workspaces".to_string(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables. Does not itself
    /// read `.env` — the caller loads it (via `dotenvy`) first.
    pub fn from_env() -> AppResult<Self> {
        Ok(Self {
            semantic_scholar_api_key: std::env::var("SEMANTIC_SCHOLAR_API_KEY").ok(),
            openalex_email: std::env::var("OPENALEX_EMAIL").ok(),
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            openai_model: std::env::var("OPENAI_MODEL").ok(),
            gemini_api_key: std::env::var("GEMINI_API_KEY").ok(),
            gemini_model: std::env::var("GEMINI_MODEL").ok(),
            codex_cli_path: std::env::var("CODEX_CLI_PATH").unwrap_or_else(|_| "codex".to_string()),
            default_llm_provider: Self::parse_provider_from_env()?,
            default_model: std::env::var("LLM_MODEL").ok(),
            retry_count: std::env::var("API_RETRY_COUNT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            retry_wait_time: std::env::var("API_RETRY_WAIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1),
            workspace_root: std::env::var("WORKSPACE_ROOT")
                .unwrap_or_else(|_| "workspaces".to_string()),
        })
    }

    fn parse_provider_from_env() -> AppResult<LlmProviderType> {
        match std::env::var("LLM_PROVIDER") {
            Ok(v) => v.parse(),
            Err(_) => Ok(LlmProviderType::default()),
        }
    }

    pub fn has_openai(&self) -> bool {
        self.openai_api_key.is_some()
    }

    pub fn has_gemini(&self) -> bool {
        self.gemini_api_key.is_some()
    }

    /// Fail fast (before any stage runs) if the selected provider is
    /// missing its credentials, per the ambient-config contract.
    pub fn require_provider_ready(&self, provider: LlmProviderType) -> AppResult<()> {
        match provider {
            LlmProviderType::OpenAi if !self.has_openai() => Err(AppError::ConfigError(
                "OPENAI_API_KEY is not set".to_string(),
            )),
            LlmProviderType::Gemini if !self.has_gemini() => Err(AppError::ConfigError(
                "GEMINI_API_KEY is not set".to_string(),
            )),
            _ => Ok(()),
        }
    }

    pub fn with_openai_key(mut self, key: impl Into<String>) -> Self {
        self.openai_api_key = Some(key.into());
        self
    }

    pub fn with_gemini_key(mut self, key: impl Into<String>) -> Self {
        self.gemini_api_key = Some(key.into());
        self
    }

    pub fn with_provider(mut self, provider: LlmProviderType) -> Self {
        self.default_llm_provider = provider;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn with_retry_config(mut self, count: u32, wait_time: u64) -> Self {
        self.retry_count = count;
        self.retry_wait_time = wait_time;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.default_llm_provider, LlmProviderType::OpenAi);
        assert_eq!(config.retry_count, 3);
        assert_eq!(config.workspace_root, "workspaces");
    }

    #[test]
    fn test_config_builder() {
        let config = Config::new()
            .with_gemini_key("test-key")
            .with_provider(LlmProviderType::Gemini)
            .with_model("gemini-2.5-pro");

        assert!(config.has_gemini());
        assert_eq!(config.default_llm_provider, LlmProviderType::Gemini);
        assert_eq!(config.default_model, Some("gemini-2.5-pro".to_string()));
    }

    #[test]
    fn test_require_provider_ready() {
        let config = Config::new();
        assert!(config.require_provider_ready(LlmProviderType::OpenAi).is_err());
        assert!(config.require_provider_ready(LlmProviderType::CodexCli).is_ok());
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!("openai".parse::<LlmProviderType>().unwrap(), LlmProviderType::OpenAi);
        assert_eq!("codex".parse::<LlmProviderType>().unwrap(), LlmProviderType::CodexCli);
        assert!("bogus".parse::<LlmProviderType>().is_err());
    }
}
