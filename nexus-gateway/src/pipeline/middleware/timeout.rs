//! Timeout middleware: bounds the rest of the chain with a deadline.
//!
//! Composes by racing the downstream future against the deadline, so a
//! retry sleeping in backoff is cut off just like a slow upstream call.

use nexus_models_sdk::error::ProviderError;
use std::time::Duration;

use crate::gateway_error::GatewayError;
use crate::pipeline::{priority, Middleware, Next, PipelineRequest, PipelineResponse};

pub struct TimeoutMiddleware {
    timeout: Duration,
}

impl TimeoutMiddleware {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait::async_trait]
impl Middleware for TimeoutMiddleware {
    fn name(&self) -> &'static str {
        "timeout"
    }

    fn priority(&self) -> i32 {
        priority::TIMEOUT
    }

    async fn process(
        &self,
        request: &mut PipelineRequest,
        next: Next<'_>,
    ) -> Result<PipelineResponse, GatewayError> {
        match tokio::time::timeout(self.timeout, next.run(request)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Provider(ProviderError::Timeout)),
        }
    }
}
