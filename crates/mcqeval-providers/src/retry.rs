//! Retry wrapper for transient answer-service failures.

use std::time::Duration;

use async_trait::async_trait;

use mcqeval_core::error::ProviderError;
use mcqeval_core::traits::{AnswerService, ModelInfo};

const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Wraps an [`AnswerService`] with exponential backoff.
///
/// Permanent failures (bad credentials, unknown model) return immediately.
/// A rate-limit `retry_after_ms` hint replaces the next delay.
pub struct RetryingService {
    inner: Box<dyn AnswerService>,
    max_retries: u32,
    base_delay: Duration,
}

impl RetryingService {
    pub fn new(inner: Box<dyn AnswerService>, max_retries: u32, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
        }
    }
}

#[async_trait]
impl AnswerService for RetryingService {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate_answer(&self, prompt: &str) -> anyhow::Result<String> {
        let mut retry_delay = self.base_delay;
        let mut attempt = 0;
        loop {
            let err = match self.inner.generate_answer(prompt).await {
                Ok(reply) => return Ok(reply),
                Err(e) => e,
            };

            let typed = err.downcast_ref::<ProviderError>();
            if typed.is_some_and(ProviderError::is_permanent) || attempt >= self.max_retries {
                return Err(err);
            }
            if let Some(ms) = typed.and_then(ProviderError::retry_after_ms) {
                retry_delay = Duration::from_millis(ms);
            }

            attempt += 1;
            tracing::warn!(
                service = self.inner.name(),
                attempt,
                delay_ms = retry_delay.as_millis() as u64,
                error = %err,
                "retrying answer request"
            );
            tokio::time::sleep(retry_delay).await;
            retry_delay = (retry_delay * 2).min(MAX_RETRY_DELAY);
        }
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        self.inner.available_models()
    }
}
