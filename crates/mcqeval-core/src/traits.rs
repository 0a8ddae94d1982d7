//! Core trait definitions for answer services and question stores.
//!
//! Answer services are implemented by the `mcqeval-providers` crate; the
//! stores live in [`crate::store`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::{Domain, Evaluation, Question};

// ---------------------------------------------------------------------------
// Answer service trait
// ---------------------------------------------------------------------------

/// A remote text-generation endpoint that answers prompts.
///
/// Implementations own their timeout and retry behavior. Ordinary service
/// failures are returned as errors, preferably wrapping
/// [`crate::error::ProviderError`], never as panics.
#[async_trait]
pub trait AnswerService: Send + Sync {
    /// Human-readable service name (e.g. "openai").
    fn name(&self) -> &str;

    /// Generate a reply for a prompt.
    async fn generate_answer(&self, prompt: &str) -> anyhow::Result<String>;

    /// Models this service is known to offer.
    fn available_models(&self) -> Vec<ModelInfo> {
        Vec::new()
    }
}

/// Information about an available model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model identifier.
    pub id: String,
    /// Human-readable model name.
    pub name: String,
    /// Provider name.
    pub provider: String,
    /// Maximum context window size in tokens.
    pub max_context: u32,
}

// ---------------------------------------------------------------------------
// Question store trait
// ---------------------------------------------------------------------------

/// Result of a conditional result write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The question existed and now holds the new evaluation.
    Updated,
    /// No question with that id exists anymore; nothing was written.
    Missing,
}

/// Persistence for questions, grouped into one collection per domain.
#[async_trait]
pub trait QuestionStore: Send + Sync {
    /// Every question of a domain, in store order.
    async fn list_all(&self, domain: Domain) -> anyhow::Result<Vec<Question>>;

    /// Up to `n` distinct questions drawn at random. Returns the whole
    /// domain when it holds fewer than `n` questions.
    async fn sample_random(&self, domain: Domain, n: usize) -> anyhow::Result<Vec<Question>>;

    /// Overwrite the evaluation of a question. Last write wins.
    async fn record_result(
        &self,
        question_id: &str,
        evaluation: Evaluation,
    ) -> anyhow::Result<RecordOutcome>;
}
