//! The `Services` context record: an explicit bundle of external
//! capabilities passed into every stage call, replacing a global LLM
//! singleton (design notes §9).

pub mod chat;
pub mod concurrency;
pub mod metadata;
pub mod pdf;
pub mod providers;
pub mod rate_limit;

use crate::services::chat::ChatService;
use crate::services::metadata::{ArxivGateway, DblpSource, OpenAlexSource, SemanticScholarSource};
use crate::services::pdf::PdfReader;
use crate::services::rate_limit::RateLimiter;
use crate::shared::config::{Config, LlmProviderType};
use crate::shared::errors::AppResult;
use std::sync::Arc;

/// Everything a stage needs to reach the outside world, assembled once
/// at CLI startup and threaded through every `pipeline::*::run` call.
pub struct Services {
    pub chat: Arc<dyn ChatService>,
    pub arxiv: ArxivGateway,
    pub semantic_scholar: Arc<SemanticScholarSource>,
    pub dblp: Arc<DblpSource>,
    pub openalex: Arc<OpenAlexSource>,
    pub pdf: Arc<dyn PdfReader>,
    pub arxiv_limiter: Arc<RateLimiter>,
    pub semantic_scholar_limiter: Arc<RateLimiter>,
    pub dblp_limiter: Arc<RateLimiter>,
    pub openalex_limiter: Arc<RateLimiter>,
    /// Bounded-concurrency cap for per-paper fan-out (Filter-Seed,
    /// Review, Harvest-Other). Default 3-5 per the concurrency model.
    pub concurrency: usize,
}

impl Services {
    pub fn from_config(config: &Config, provider: LlmProviderType) -> AppResult<Self> {
        let chat: Arc<dyn ChatService> = match provider {
            LlmProviderType::OpenAi => Arc::new(providers::OpenAiChatService::new(
                config.openai_model.clone().unwrap_or_else(|| "gpt-4o".to_string()),
            )),
            LlmProviderType::Gemini => Arc::new(providers::GeminiChatService::new(
                config.gemini_api_key.clone().unwrap_or_default(),
                config.gemini_model.clone().unwrap_or_else(|| "gemini-2.5-pro".to_string()),
            )),
            LlmProviderType::CodexCli => Arc::new(providers::CodexCliChatService::new(
                config.codex_cli_path.clone(),
                "gpt-5-codex".to_string(),
            )),
        };

        Ok(Self {
            chat,
            arxiv: ArxivGateway::new(),
            semantic_scholar: Arc::new(
                SemanticScholarSource::new().with_retry_config(config.retry_count as u64, config.retry_wait_time),
            ),
            dblp: Arc::new(DblpSource::new()),
            openalex: Arc::new(OpenAlexSource::new(config.openalex_email.clone())),
            pdf: Arc::new(pdf::RsrppPdfReader::new()),
            arxiv_limiter: RateLimiter::arxiv(),
            semantic_scholar_limiter: RateLimiter::semantic_scholar(config.semantic_scholar_api_key.is_some()),
            dblp_limiter: RateLimiter::dblp(),
            openalex_limiter: RateLimiter::openalex(),
            concurrency: 4,
        })
    }
}
