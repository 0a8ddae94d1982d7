//! Offline answer service for dry runs and tests.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use mcqeval_core::traits::{AnswerService, ModelInfo};

/// Answers every prompt with the same reply, without touching the network.
pub struct MockAnswerService {
    response: String,
    call_count: AtomicU32,
}

impl MockAnswerService {
    pub fn with_fixed_response(response: &str) -> Self {
        Self {
            response: response.to_string(),
            call_count: AtomicU32::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AnswerService for MockAnswerService {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate_answer(&self, _prompt: &str) -> anyhow::Result<String> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        Ok(self.response.clone())
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![ModelInfo {
            id: "mock-model".into(),
            name: "Mock Model".into(),
            provider: "mock".into(),
            max_context: 100_000,
        }]
    }
}
