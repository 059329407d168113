//! Cache middleware: read-through and write-through with single flight.
//!
//! Only plain completions are cacheable; streaming and embedding requests
//! bypass this middleware entirely. On a hit the chain short-circuits, the
//! response is marked cached, and the context cache-hit flag is set so the
//! response-phase middlewares still see an accurate picture on the way out.
//! Concurrent misses for one fingerprint coalesce onto a single upstream
//! call; waiters share the leader's outcome.

use nexus_models_sdk::cache::{fingerprint, CachedResponse, Flight, ResponseCache, SingleFlight};
use nexus_models_sdk::models::ChatResponse;
use std::sync::Arc;
use std::time::Duration;

use crate::gateway_error::GatewayError;
use crate::pipeline::{
    priority, Middleware, Next, PipelineRequest, PipelineResponse, RequestKind,
    STATE_CACHE_DISABLED,
};

type FlightOutcome = Result<ChatResponse, Arc<GatewayError>>;

pub struct CacheMiddleware {
    cache: Arc<dyn ResponseCache>,
    ttl: Duration,
    flights: SingleFlight<FlightOutcome>,
}

impl CacheMiddleware {
    pub fn new(cache: Arc<dyn ResponseCache>, ttl: Duration) -> Self {
        Self {
            cache,
            ttl,
            flights: SingleFlight::new(),
        }
    }
}

#[async_trait::async_trait]
impl Middleware for CacheMiddleware {
    fn name(&self) -> &'static str {
        "cache"
    }

    fn priority(&self) -> i32 {
        priority::CACHE
    }

    async fn process(
        &self,
        request: &mut PipelineRequest,
        next: Next<'_>,
    ) -> Result<PipelineResponse, GatewayError> {
        // Streaming responses are never cached.
        let cacheable = matches!(request.kind, RequestKind::Complete(_))
            && !request
                .state
                .get(STATE_CACHE_DISABLED)
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false);
        if !cacheable {
            return next.run(request).await;
        }

        let chat = request.chat().expect("completion request carries a chat body");
        let key = fingerprint(chat);

        if let Some(cached) = self.cache.get(&key).await {
            let mut response = cached.response;
            response.cached = true;
            request.context.cache_hit = true;
            tracing::debug!(key = %key, "cache hit");
            return Ok(PipelineResponse::Completion(response));
        }

        match self.flights.begin(&key).await {
            Flight::Leader(leader) => match next.run(request).await {
                Ok(PipelineResponse::Completion(response)) => {
                    self.cache
                        .set(&key, CachedResponse::new(response.clone(), self.ttl))
                        .await;
                    leader.complete(Ok(response.clone()));
                    Ok(PipelineResponse::Completion(response))
                }
                Ok(other) => Ok(other),
                Err(err) => {
                    let shared = Arc::new(err);
                    leader.complete(Err(Arc::clone(&shared)));
                    Err(GatewayError::Shared(shared))
                }
            },
            Flight::Shared(Ok(response)) => {
                tracing::debug!(key = %key, "coalesced with in-flight request");
                Ok(PipelineResponse::Completion(response))
            }
            Flight::Shared(Err(shared)) => Err(GatewayError::Shared(shared)),
        }
    }
}
