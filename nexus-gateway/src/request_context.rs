//! Per-request scope carried through the pipeline.
//!
//! One context per request task. It holds the request id, the tenant and
//! key that authorized the call, whatever the pipeline learns along the way
//! (current provider, cache-hit flag), and the response headers recorded on
//! the way out. Only the owning task writes to it.

use std::collections::HashMap;
use std::time::Instant;
use uuid::Uuid;

/// Request-scoped context.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique request id for tracing and response headers.
    pub request_id: String,
    /// Tenant that owns the request, when authenticated.
    pub tenant_id: Option<String>,
    /// API key id that authorized the request.
    pub key_id: Option<String>,
    /// Name of the provider that served (or is serving) the request.
    pub provider: Option<String>,
    /// Set when the response was served from cache.
    pub cache_hit: bool,
    /// Request start, for latency accounting.
    pub start_time: Instant,
    /// Response headers recorded by the pipeline.
    pub response_headers: HashMap<String, String>,
    /// Free-form metadata.
    pub metadata: HashMap<String, String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            tenant_id: None,
            key_id: None,
            provider: None,
            cache_hit: false,
            start_time: Instant::now(),
            response_headers: HashMap::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_tenant(tenant_id: Option<String>, key_id: Option<String>) -> Self {
        Self {
            tenant_id,
            key_id,
            ..Self::new()
        }
    }

    /// Elapsed time since the request entered the pipeline.
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_context() {
        let ctx = RequestContext::new();
        assert!(!ctx.request_id.is_empty());
        assert!(!ctx.cache_hit);
        assert!(ctx.provider.is_none());
    }

    #[test]
    fn test_context_ids_are_unique() {
        assert_ne!(RequestContext::new().request_id, RequestContext::new().request_id);
    }
}
