//! # Gateway Error Taxonomy
//!
//! Every failure the core surfaces to a caller, with the OpenAI-compatible
//! status and error-type mapping the external HTTP layer applies. The
//! pipeline decorates errors with the provider or tenant context that raised
//! them; middlewares recover locally only where they can (retry, cache, and
//! usage swallow their own transient failures), everything else propagates.

use nexus_models_sdk::error::ProviderError;
use nexus_models_sdk::routing::RoutingError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Response header carrying the request id.
pub const HEADER_REQUEST_ID: &str = "X-Nexus-Request-Id";
/// Response header naming the provider that served the request.
pub const HEADER_PROVIDER: &str = "X-Nexus-Provider";
/// Response header flagging a cache hit.
pub const HEADER_CACHE_HIT: &str = "X-Nexus-Cache-Hit";
/// Response header carrying total gateway latency in milliseconds.
pub const HEADER_LATENCY_MS: &str = "X-Nexus-Latency-Ms";
/// Response header identifying the gateway itself.
pub const HEADER_GATEWAY: &str = "X-Nexus-Gateway";

/// Errors surfaced by the gateway core.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// No provider registered under the requested name.
    #[error("Provider not found: {provider}")]
    ProviderNotFound { provider: String },

    /// Routing found no healthy candidate.
    #[error("No healthy providers available")]
    NoHealthyProviders,

    /// The selected provider does not serve the requested model.
    #[error("Model not supported: {model}")]
    ModelNotSupported { model: String },

    /// Every candidate failed after the configured retries.
    #[error("All providers failed after {attempts} attempts: {last}")]
    AllProvidersFailed { attempts: u32, last: String },

    /// Missing or unusable credentials.
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    /// The presented API key does not verify.
    #[error("Invalid API key")]
    KeyInvalid,

    /// The API key exists but was revoked or has expired.
    #[error("API key revoked")]
    KeyRevoked,

    /// Referenced tenant does not exist.
    #[error("Tenant not found: {tenant}")]
    TenantNotFound { tenant: String },

    /// Tenant exists but is disabled or suspended.
    #[error("Tenant disabled: {tenant}")]
    TenantDisabled { tenant: String },

    /// A tenant request or token quota was exhausted.
    #[error("Quota exceeded: {message}")]
    QuotaExceeded { message: String },

    /// The tenant's monthly USD budget would be exceeded.
    #[error("Monthly budget exceeded: {message}")]
    BudgetExceeded { message: String },

    /// The global request rate limit was hit.
    #[error("Rate limit exceeded")]
    RateLimited,

    /// A guard refused the content.
    #[error("Content blocked: {reason}")]
    ContentBlocked { reason: String },

    /// Input exceeds the model context window and the policy is to fail.
    #[error("Context overflow: {estimated} tokens exceed window of {window}")]
    ContextOverflow { estimated: u32, window: u32 },

    /// Alias resolution was required by policy but found nothing.
    #[error("Alias not found: {alias}")]
    AliasNotFound { alias: String },

    /// An alias resolved to an empty target list.
    #[error("No targets available for alias: {alias}")]
    NoTargetsAvailable { alias: String },

    /// A circuit breaker is open for the provider.
    #[error("Circuit open for provider: {provider}")]
    CircuitOpen { provider: String },

    /// Generic pipeline abort.
    #[error("Pipeline aborted: {reason}")]
    PipelineAborted { reason: String },

    /// An upstream provider failure, decorated where it was raised.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// A routing failure.
    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    /// Invalid gateway configuration.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A failure shared from a coalesced in-flight request.
    #[error("{0}")]
    Shared(std::sync::Arc<GatewayError>),
}

impl GatewayError {
    pub fn aborted(reason: impl Into<String>) -> Self {
        GatewayError::PipelineAborted {
            reason: reason.into(),
        }
    }

    /// Whether this error came from the upstream call path, which makes it
    /// eligible for the all-providers-failed wrapper after retry exhaustion.
    pub fn is_upstream(&self) -> bool {
        match self {
            GatewayError::Provider(_) => true,
            GatewayError::Shared(inner) => inner.is_upstream(),
            _ => false,
        }
    }

    /// HTTP status the external handler maps this error to.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::Shared(inner) => inner.status_code(),
            GatewayError::ContextOverflow { .. } => 400,
            GatewayError::Unauthorized { .. }
            | GatewayError::KeyInvalid
            | GatewayError::KeyRevoked => 401,
            GatewayError::TenantDisabled { .. } | GatewayError::ContentBlocked { .. } => 403,
            GatewayError::ProviderNotFound { .. }
            | GatewayError::TenantNotFound { .. }
            | GatewayError::ModelNotSupported { .. }
            | GatewayError::AliasNotFound { .. }
            | GatewayError::NoTargetsAvailable { .. } => 404,
            GatewayError::QuotaExceeded { .. }
            | GatewayError::BudgetExceeded { .. }
            | GatewayError::RateLimited => 429,
            GatewayError::Provider(ProviderError::NotSupported { .. }) => 501,
            GatewayError::Provider(ProviderError::RateLimit) => 429,
            GatewayError::Provider(ProviderError::Authentication { .. }) => 401,
            GatewayError::NoHealthyProviders
            | GatewayError::AllProvidersFailed { .. }
            | GatewayError::CircuitOpen { .. }
            | GatewayError::Provider(_)
            | GatewayError::Routing(_) => 502,
            GatewayError::PipelineAborted { .. } | GatewayError::Configuration { .. } => 500,
        }
    }

    /// OpenAI-compatible error type derived from the status code.
    pub fn error_type(&self) -> &'static str {
        match self.status_code() {
            400 => "invalid_request_error",
            401 => "authentication_error",
            403 => "permission_error",
            404 => "not_found_error",
            429 => "rate_limit_error",
            501 => "not_implemented",
            _ => "internal_error",
        }
    }
}

/// OpenAI-compatible error body: `{"error":{"message","type"}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
}

impl From<&GatewayError> for ErrorBody {
    fn from(err: &GatewayError) -> Self {
        Self {
            error: ErrorDetail {
                message: err.to_string(),
                error_type: err.error_type().to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(GatewayError::KeyInvalid.status_code(), 401);
        assert_eq!(
            GatewayError::TenantDisabled { tenant: "t".into() }.status_code(),
            403
        );
        assert_eq!(GatewayError::RateLimited.status_code(), 429);
        assert_eq!(
            GatewayError::Provider(ProviderError::NotSupported { feature: "embeddings".into() })
                .status_code(),
            501
        );
        assert_eq!(
            GatewayError::AllProvidersFailed { attempts: 3, last: "boom".into() }.status_code(),
            502
        );
    }

    #[test]
    fn test_error_type_follows_status() {
        assert_eq!(GatewayError::KeyInvalid.error_type(), "authentication_error");
        assert_eq!(GatewayError::RateLimited.error_type(), "rate_limit_error");
        assert_eq!(
            GatewayError::ContextOverflow { estimated: 9000, window: 8192 }.error_type(),
            "invalid_request_error"
        );
        assert_eq!(
            GatewayError::aborted("broken").error_type(),
            "internal_error"
        );
    }

    #[test]
    fn test_error_body_shape() {
        let err = GatewayError::ContentBlocked { reason: "pii".into() };
        let body = ErrorBody::from(&err);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["error"]["type"], "permission_error");
        assert!(json["error"]["message"].as_str().unwrap().contains("pii"));
    }
}
