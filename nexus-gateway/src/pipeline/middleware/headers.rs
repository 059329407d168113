//! Response-headers middleware: records the gateway headers from pipeline
//! state on the way out, for every outcome including cache hits.

use std::collections::HashMap;

use crate::gateway_error::{
    GatewayError, HEADER_CACHE_HIT, HEADER_GATEWAY, HEADER_LATENCY_MS, HEADER_PROVIDER,
    HEADER_REQUEST_ID,
};
use crate::pipeline::{priority, Middleware, Next, PipelineRequest, PipelineResponse};

pub struct ResponseHeadersMiddleware;

#[async_trait::async_trait]
impl Middleware for ResponseHeadersMiddleware {
    fn name(&self) -> &'static str {
        "response_headers"
    }

    fn priority(&self) -> i32 {
        priority::RESPONSE_HEADERS
    }

    async fn process(
        &self,
        request: &mut PipelineRequest,
        next: Next<'_>,
    ) -> Result<PipelineResponse, GatewayError> {
        let mut result = next.run(request).await;

        let context = &mut request.context;
        let mut headers = HashMap::new();
        headers.insert(HEADER_REQUEST_ID.to_string(), context.request_id.clone());
        headers.insert(
            HEADER_GATEWAY.to_string(),
            format!("nexus/{}", env!("CARGO_PKG_VERSION")),
        );
        headers.insert(HEADER_CACHE_HIT.to_string(), context.cache_hit.to_string());
        headers.insert(HEADER_LATENCY_MS.to_string(), context.elapsed_ms().to_string());
        if let Some(provider) = &context.provider {
            headers.insert(HEADER_PROVIDER.to_string(), provider.clone());
        }
        context.response_headers = headers.clone();

        if let Ok(response) = result.as_mut() {
            if let Some(completion) = response.completion_mut() {
                for (name, value) in &headers {
                    completion
                        .state
                        .insert(name.clone(), serde_json::Value::String(value.clone()));
                }
            }
        }

        result
    }
}
