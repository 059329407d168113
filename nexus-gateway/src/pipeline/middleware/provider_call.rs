//! Provider-call middleware: the innermost step, always present.
//!
//! Dispatches on the request kind: completions and streams consult the
//! router for a healthy provider (honoring an alias-chosen provider as a
//! constraint), embeddings go to the first provider that supports them.
//! Every outcome feeds the health tracker.

use nexus_models_sdk::error::ProviderError;
use nexus_models_sdk::providers::Provider;
use nexus_models_sdk::registry::ProviderRegistry;
use nexus_models_sdk::routing::{strategy_from_name, Router};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::gateway_error::GatewayError;
use crate::pipeline::{
    priority, Middleware, Next, PipelineRequest, PipelineResponse, RequestKind,
    STATE_ALIAS_PROVIDER, STATE_ROUTING_STRATEGY,
};

pub struct ProviderCallMiddleware {
    registry: Arc<ProviderRegistry>,
    router: Arc<Router>,
    costs: HashMap<String, f64>,
}

impl ProviderCallMiddleware {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        router: Arc<Router>,
        costs: HashMap<String, f64>,
    ) -> Self {
        Self {
            registry,
            router,
            costs,
        }
    }

    fn select_chat_provider(
        &self,
        request: &PipelineRequest,
    ) -> Result<Arc<dyn Provider>, GatewayError> {
        let constraint = request
            .state
            .get(STATE_ALIAS_PROVIDER)
            .and_then(serde_json::Value::as_str);

        let candidates: Vec<Arc<dyn Provider>> = match constraint {
            Some(name) => {
                let provider =
                    self.registry
                        .get(name)
                        .ok_or_else(|| GatewayError::ProviderNotFound {
                            provider: name.to_string(),
                        })?;
                vec![provider]
            }
            None => self.registry.with_capability("chat"),
        };

        // A tenant-configured strategy overrides the gateway default.
        let tenant_strategy = request
            .state
            .get(STATE_ROUTING_STRATEGY)
            .and_then(serde_json::Value::as_str)
            .and_then(strategy_from_name);

        match tenant_strategy {
            Some(strategy) => Ok(self
                .router
                .route_with(strategy.as_ref(), &candidates, &self.costs)?),
            None => Ok(self.router.route(&candidates, &self.costs)?),
        }
    }
}

#[async_trait::async_trait]
impl Middleware for ProviderCallMiddleware {
    fn name(&self) -> &'static str {
        "provider_call"
    }

    fn priority(&self) -> i32 {
        priority::PROVIDER_CALL
    }

    async fn process(
        &self,
        request: &mut PipelineRequest,
        _next: Next<'_>,
    ) -> Result<PipelineResponse, GatewayError> {
        let health = Arc::clone(self.router.health());

        match &request.kind {
            RequestKind::Complete(chat) => {
                let chat = chat.clone();
                let provider = self.select_chat_provider(request)?;
                let name = provider.name().to_string();
                request.context.provider = Some(name.clone());

                let start = Instant::now();
                match provider.complete(chat).await {
                    Ok(mut response) => {
                        health.record_success(&name, start.elapsed());
                        if response.provider.is_empty() {
                            response.provider = name;
                        }
                        if response.latency_ms == 0 {
                            response.latency_ms = start.elapsed().as_millis() as u64;
                        }
                        Ok(PipelineResponse::Completion(response))
                    }
                    Err(err) => {
                        health.record_failure(&name, err.to_string());
                        Err(GatewayError::Provider(err))
                    }
                }
            }
            RequestKind::Stream(chat) => {
                let mut chat = chat.clone();
                chat.stream = Some(true);
                let provider = self.select_chat_provider(request)?;
                let name = provider.name().to_string();
                request.context.provider = Some(name.clone());

                let start = Instant::now();
                match provider.complete_stream(chat).await {
                    Ok(stream) => {
                        // Latency here is time to open the stream, not time
                        // to drain it.
                        health.record_success(&name, start.elapsed());
                        Ok(PipelineResponse::Stream(stream))
                    }
                    Err(err) => {
                        health.record_failure(&name, err.to_string());
                        Err(GatewayError::Provider(err))
                    }
                }
            }
            RequestKind::Embed(embed) => {
                let embed = embed.clone();
                let provider = self
                    .registry
                    .with_capability("embeddings")
                    .into_iter()
                    .next()
                    .ok_or(GatewayError::Provider(ProviderError::NotSupported {
                        feature: "embeddings".to_string(),
                    }))?;
                let name = provider.name().to_string();
                request.context.provider = Some(name.clone());

                let start = Instant::now();
                match provider.embed(embed).await {
                    Ok(response) => {
                        health.record_success(&name, start.elapsed());
                        Ok(PipelineResponse::Embedding(response))
                    }
                    Err(err) => {
                        health.record_failure(&name, err.to_string());
                        Err(GatewayError::Provider(err))
                    }
                }
            }
        }
    }
}
