//! Tracing middleware: opens a span for the whole request and logs the
//! outcome on the way out.

use tracing::Instrument;

use crate::gateway_error::GatewayError;
use crate::pipeline::{priority, Middleware, Next, PipelineRequest, PipelineResponse};

pub struct TracingMiddleware;

#[async_trait::async_trait]
impl Middleware for TracingMiddleware {
    fn name(&self) -> &'static str {
        "tracing"
    }

    fn priority(&self) -> i32 {
        priority::TRACING
    }

    async fn process(
        &self,
        request: &mut PipelineRequest,
        next: Next<'_>,
    ) -> Result<PipelineResponse, GatewayError> {
        let span = tracing::info_span!(
            "gateway_request",
            request_id = %request.context.request_id,
            model = %request.model(),
            tenant = request.context.tenant_id.as_deref().unwrap_or(""),
        );

        async {
            tracing::debug!("request entered pipeline");
            let result = next.run(request).await;
            match &result {
                Ok(_) => tracing::debug!(
                    cache_hit = request.context.cache_hit,
                    provider = request.context.provider.as_deref().unwrap_or(""),
                    latency_ms = request.context.elapsed_ms(),
                    "request completed"
                ),
                Err(err) => tracing::warn!(error = %err, "request failed"),
            }
            result
        }
        .instrument(span)
        .await
    }
}
