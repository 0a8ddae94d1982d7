//! mcqeval-providers: answer-service integrations.
//!
//! Implements the `AnswerService` trait for OpenAI, Anthropic, Gemini,
//! and Ollama, plus an offline mock and a retrying wrapper.

pub mod anthropic;
pub mod config;
pub mod gemini;
mod http;
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod retry;

pub use config::{
    create_provider, load_config_from, GenerationSettings, McqevalConfig, ProviderConfig,
};
pub use mcqeval_core::error::ProviderError;
pub use retry::RetryingService;
