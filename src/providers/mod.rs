pub mod base;
pub mod errors;
pub mod gemini;
pub mod prompts;

pub use base::{AiProvider, ProviderMetrics, RetryConfig};
pub use gemini::GeminiProvider;
