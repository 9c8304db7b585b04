use async_trait::async_trait;
use std::time::Duration;

use crate::session::ChatTurn;

/// Metrics for provider operations
#[derive(Debug, Clone, Default)]
pub struct ProviderMetrics {
    pub request_count: u64,
    pub token_count: u64,
    pub error_count: u64,
}

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        // Dispatch wraps AI calls in a 30s timeout, so the retry budget
        // has to fit well inside that.
        Self {
            max_retries: 2,
            initial_delay_ms: 500,
            max_delay_ms: 4000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Delay before retry `attempt` (0-based), exponential with a little jitter
/// so concurrent dispatch tasks do not hammer the API in lockstep.
pub fn backoff_delay(config: &RetryConfig, attempt: usize) -> Duration {
    let base = (config.initial_delay_ms as f64
        * config.backoff_multiplier.powi(attempt as i32))
    .min(config.max_delay_ms as f64) as u64;
    Duration::from_millis(base + fastrand::u64(0..=250))
}

/// AI backend as the dispatch pipeline sees it: free-form chat plus document
/// and image analysis. Implementations return user-presentable text.
#[async_trait]
pub trait AiProvider: Send + Sync {
    async fn chat(&self, prompt: &str, history: &[ChatTurn]) -> anyhow::Result<String>;

    async fn analyze_text(
        &self,
        content: &str,
        filename: &str,
        file_type: &str,
    ) -> anyhow::Result<String>;

    async fn analyze_image(&self, bytes: &[u8], mime: &str) -> anyhow::Result<String>;
}
