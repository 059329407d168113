//! # Provider Error Types
//!
//! Errors raised by provider adapters and the SDK machinery around them.
//! The gateway crate wraps these into its own surfaced taxonomy; inside the
//! SDK everything provider-facing funnels through [`ProviderError`].

use thiserror::Error;

/// Provider-specific API and communication errors.
///
/// Adapters translate their upstream failures into this enum so the routing
/// and retry layers can treat every provider uniformly.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// HTTP client and network communication errors.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider API errors with status code and message.
    #[error("API error: {code} - {message}")]
    Api { code: u16, message: String },

    /// Invalid or rejected credentials.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// Requested model not found or unsupported by the provider.
    #[error("Model not found: {model}")]
    ModelNotFound { model: String },

    /// Provider-side rate limit.
    #[error("Rate limit exceeded")]
    RateLimit,

    /// Provider service temporarily unavailable.
    #[error("Service unavailable")]
    ServiceUnavailable,

    /// Request timed out.
    #[error("Timeout")]
    Timeout,

    /// Sentinel for operations the provider does not implement, for example
    /// embeddings on a chat-only provider. Never a partial success.
    #[error("Not supported: {feature}")]
    NotSupported { feature: String },

    /// Response body parsing failures.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed or unexpected response shape.
    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    /// Invalid or missing provider configuration.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Missing credential for a provider using a dynamic credential source.
    #[error("Credential not found for provider: {provider}")]
    CredentialNotFound { provider: String },

    /// Stream-level failures surfaced mid-consumption.
    #[error("Stream error: {message}")]
    Stream { message: String },
}

impl ProviderError {
    /// Whether a retry has a reasonable chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Http(_)
                | ProviderError::RateLimit
                | ProviderError::ServiceUnavailable
                | ProviderError::Timeout
                | ProviderError::Api { code: 500..=599, .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ProviderError::Timeout.is_retryable());
        assert!(ProviderError::ServiceUnavailable.is_retryable());
        assert!(ProviderError::Api { code: 503, message: "overloaded".into() }.is_retryable());
        assert!(!ProviderError::Api { code: 400, message: "bad request".into() }.is_retryable());
        assert!(!ProviderError::NotSupported { feature: "embeddings".into() }.is_retryable());
    }
}
