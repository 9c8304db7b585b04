use thiserror::Error;

/// Typed error hierarchy for warbler.
///
/// Use at module boundaries (provider calls, channel sends, config validation).
/// Internal/leaf functions can continue using `anyhow::Result`; the `Internal`
/// variant converts via the `?` operator.
#[derive(Debug, Error)]
pub enum WarblerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Provider error: {message}")]
    Provider { message: String, retryable: bool },

    #[error("Rate limit exceeded")]
    RateLimit { retry_after: Option<u64> },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl WarblerError {
    /// Whether this error is transient and the operation should be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider { retryable, .. } => *retryable,
            Self::RateLimit { .. } | Self::Internal(_) => true,
            Self::Auth(_) | Self::Config(_) => false,
        }
    }
}
