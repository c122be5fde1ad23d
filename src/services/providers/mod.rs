pub mod codex_cli;
pub mod gemini;
pub mod openai;

pub use codex_cli::CodexCliChatService;
pub use gemini::GeminiChatService;
pub use openai::OpenAiChatService;
