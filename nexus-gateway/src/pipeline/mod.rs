//! # Request Pipeline
//!
//! A priority-ordered middleware chain composed around a single terminal
//! provider-call step. Each middleware may short-circuit (cache hit), mutate
//! (alias, transform), reject (guard, quota), or decorate (timeout, retry,
//! tracing) the call; `next` may be invoked zero, one, or several times.
//!
//! ## Composition
//!
//! `PipelineBuilder::build` sorts middlewares stably by ascending priority
//! and folds them outermost-in: the lowest band enters first on the way in
//! and exits last on the way out. Bands at or above
//! [`priority::RESPONSE_PHASE_MIN`] are response-phase observers (response
//! headers, usage tracking): they compose outside the request-phase chain so
//! they observe the final outcome of every request, including cache
//! short-circuits and guard rejections, on the way out.
//!
//! The pipeline is immutable after build and shared across requests;
//! middlewares must be concurrent-safe. Request state is per-request and
//! owned by a single task.

use futures::future::BoxFuture;
use nexus_models_sdk::models::{ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse};
use nexus_models_sdk::streaming::BoxCompletionStream;
use std::collections::HashMap;
use std::sync::Arc;

use crate::gateway_error::GatewayError;
use crate::request_context::RequestContext;

pub mod middleware;

/// Reserved priority bands. Lower bands fire earlier on the way in and
/// later on the way out.
pub mod priority {
    pub const TRACING: i32 = 10;
    pub const TIMEOUT: i32 = 20;
    pub const QUOTA: i32 = 120;
    pub const INPUT_GUARD: i32 = 150;
    pub const STREAM_GUARD: i32 = 155;
    pub const TRANSFORM: i32 = 200;
    pub const TOKEN_COUNTING: i32 = 220;
    pub const ALIAS: i32 = 250;
    pub const CACHE: i32 = 280;
    pub const TOOL_LOOP: i32 = 310;
    pub const RETRY: i32 = 340;
    pub const PROVIDER_CALL: i32 = 350;
    /// Bands at or above this compose as response-phase observers.
    pub const RESPONSE_PHASE_MIN: i32 = 500;
    pub const RESPONSE_HEADERS: i32 = 500;
    pub const USAGE: i32 = 550;
}

/// State keys written by the alias middleware.
pub const STATE_ALIAS_ORIGINAL_MODEL: &str = "alias.original_model";
/// Provider name chosen by alias resolution, honored as a routing
/// constraint by the provider-call step.
pub const STATE_ALIAS_PROVIDER: &str = "alias.provider";
/// Set by the quota gate when the tenant has opted out of caching.
pub const STATE_CACHE_DISABLED: &str = "cache.disabled";
/// Per-tenant routing strategy name, honored by the provider-call step.
pub const STATE_ROUTING_STRATEGY: &str = "routing.strategy";

/// The three request kinds that flow through one chain.
#[derive(Debug, Clone)]
pub enum RequestKind {
    Complete(ChatRequest),
    Stream(ChatRequest),
    Embed(EmbeddingRequest),
}

/// A request travelling the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub kind: RequestKind,
    pub context: RequestContext,
    /// Per-request scratch state, written only by the owning task.
    pub state: HashMap<String, serde_json::Value>,
}

impl PipelineRequest {
    pub fn new(kind: RequestKind, context: RequestContext) -> Self {
        Self {
            kind,
            context,
            state: HashMap::new(),
        }
    }

    pub fn completion(chat: ChatRequest) -> Self {
        let context =
            RequestContext::with_tenant(chat.tenant_id.clone(), chat.key_id.clone());
        Self::new(RequestKind::Complete(chat), context)
    }

    pub fn streaming(chat: ChatRequest) -> Self {
        let context =
            RequestContext::with_tenant(chat.tenant_id.clone(), chat.key_id.clone());
        Self::new(RequestKind::Stream(chat), context)
    }

    pub fn embedding(embed: EmbeddingRequest) -> Self {
        let context =
            RequestContext::with_tenant(embed.tenant_id.clone(), embed.key_id.clone());
        Self::new(RequestKind::Embed(embed), context)
    }

    pub fn is_stream(&self) -> bool {
        matches!(self.kind, RequestKind::Stream(_))
    }

    /// The chat request, for the completion and streaming kinds.
    pub fn chat(&self) -> Option<&ChatRequest> {
        match &self.kind {
            RequestKind::Complete(chat) | RequestKind::Stream(chat) => Some(chat),
            RequestKind::Embed(_) => None,
        }
    }

    pub fn chat_mut(&mut self) -> Option<&mut ChatRequest> {
        match &mut self.kind {
            RequestKind::Complete(chat) | RequestKind::Stream(chat) => Some(chat),
            RequestKind::Embed(_) => None,
        }
    }

    /// The model named by the request, whatever its kind.
    pub fn model(&self) -> &str {
        match &self.kind {
            RequestKind::Complete(chat) | RequestKind::Stream(chat) => &chat.model,
            RequestKind::Embed(embed) => &embed.model,
        }
    }
}

/// A pipeline outcome, one variant per request kind.
pub enum PipelineResponse {
    Completion(ChatResponse),
    Stream(BoxCompletionStream),
    Embedding(EmbeddingResponse),
}

impl std::fmt::Debug for PipelineResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineResponse::Completion(response) => {
                f.debug_tuple("Completion").field(response).finish()
            }
            PipelineResponse::Stream(_) => f.debug_tuple("Stream").field(&"<stream>").finish(),
            PipelineResponse::Embedding(response) => {
                f.debug_tuple("Embedding").field(response).finish()
            }
        }
    }
}

impl PipelineResponse {
    pub fn completion(&self) -> Option<&ChatResponse> {
        match self {
            PipelineResponse::Completion(response) => Some(response),
            _ => None,
        }
    }

    pub fn completion_mut(&mut self) -> Option<&mut ChatResponse> {
        match self {
            PipelineResponse::Completion(response) => Some(response),
            _ => None,
        }
    }

    pub fn into_completion(self) -> Result<ChatResponse, GatewayError> {
        match self {
            PipelineResponse::Completion(response) => Ok(response),
            _ => Err(GatewayError::aborted("pipeline produced a non-completion response")),
        }
    }

    pub fn into_stream(self) -> Result<BoxCompletionStream, GatewayError> {
        match self {
            PipelineResponse::Stream(stream) => Ok(stream),
            _ => Err(GatewayError::aborted("pipeline produced a non-stream response")),
        }
    }

    pub fn into_embedding(self) -> Result<EmbeddingResponse, GatewayError> {
        match self {
            PipelineResponse::Embedding(response) => Ok(response),
            _ => Err(GatewayError::aborted("pipeline produced a non-embedding response")),
        }
    }
}

/// Handle to the remainder of the chain. Copyable so a middleware may call
/// downstream more than once (retry) or not at all (short-circuit).
#[derive(Clone, Copy)]
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
}

impl<'a> Next<'a> {
    /// Invoke the rest of the chain.
    pub fn run<'b>(
        self,
        request: &'b mut PipelineRequest,
    ) -> BoxFuture<'b, Result<PipelineResponse, GatewayError>>
    where
        'a: 'b,
    {
        Box::pin(async move {
            match self.chain.split_first() {
                Some((middleware, rest)) => {
                    middleware.process(request, Next { chain: rest }).await
                }
                None => Err(GatewayError::aborted(
                    "pipeline reached the end of the chain without a terminal step",
                )),
            }
        })
    }
}

/// One composable cross-cutting concern.
#[async_trait::async_trait]
pub trait Middleware: Send + Sync {
    fn name(&self) -> &'static str;

    /// Priority band; see [`priority`].
    fn priority(&self) -> i32;

    async fn process(
        &self,
        request: &mut PipelineRequest,
        next: Next<'_>,
    ) -> Result<PipelineResponse, GatewayError>;
}

/// Collects middlewares and composes the chain.
#[derive(Default)]
pub struct PipelineBuilder {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Sort stably by ascending priority and fold. Response-phase bands
    /// wrap the request-phase chain so they always observe the outcome.
    pub fn build(self) -> Pipeline {
        let (mut response_phase, mut request_phase): (Vec<_>, Vec<_>) = self
            .middlewares
            .into_iter()
            .partition(|m| m.priority() >= priority::RESPONSE_PHASE_MIN);

        request_phase.sort_by_key(|m| m.priority());
        // Highest response band is outermost: it enters first and exits
        // last, after every other middleware has spoken.
        response_phase.sort_by_key(|m| std::cmp::Reverse(m.priority()));

        let mut chain = response_phase;
        chain.extend(request_phase);
        Pipeline { chain }
    }
}

/// The immutable composed chain.
pub struct Pipeline {
    chain: Vec<Arc<dyn Middleware>>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Names in composed order, outermost first. For diagnostics.
    pub fn chain_names(&self) -> Vec<&'static str> {
        self.chain.iter().map(|m| m.name()).collect()
    }

    pub async fn run(
        &self,
        request: &mut PipelineRequest,
    ) -> Result<PipelineResponse, GatewayError> {
        Next { chain: &self.chain }.run(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_models_sdk::models::Message;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        name: &'static str,
        priority: i32,
        log: Log,
    }

    #[async_trait::async_trait]
    impl Middleware for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        async fn process(
            &self,
            request: &mut PipelineRequest,
            next: Next<'_>,
        ) -> Result<PipelineResponse, GatewayError> {
            self.log.lock().unwrap().push(format!("enter:{}", self.name));
            let result = next.run(request).await;
            self.log.lock().unwrap().push(format!("exit:{}", self.name));
            result
        }
    }

    struct Terminal {
        log: Log,
    }

    #[async_trait::async_trait]
    impl Middleware for Terminal {
        fn name(&self) -> &'static str {
            "terminal"
        }

        fn priority(&self) -> i32 {
            priority::PROVIDER_CALL
        }

        async fn process(
            &self,
            request: &mut PipelineRequest,
            _next: Next<'_>,
        ) -> Result<PipelineResponse, GatewayError> {
            self.log.lock().unwrap().push("call".to_string());
            Ok(PipelineResponse::Completion(test_response(request.model())))
        }
    }

    fn test_response(model: &str) -> ChatResponse {
        ChatResponse {
            id: "chatcmpl-1".to_string(),
            provider: "test".to_string(),
            model: model.to_string(),
            created: 0,
            choices: vec![],
            usage: None,
            latency_ms: 1,
            cost_usd: 0.0,
            cached: false,
            thinking: None,
            state: HashMap::new(),
        }
    }

    fn chat_request() -> PipelineRequest {
        PipelineRequest::completion(ChatRequest {
            model: "test-model".to_string(),
            messages: vec![Message::user("hi")],
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_entry_order_ascending_exit_reverse() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        // Registered deliberately out of order.
        let pipeline = Pipeline::builder()
            .with(Arc::new(Recorder { name: "c", priority: 300, log: log.clone() }))
            .with(Arc::new(Recorder { name: "a", priority: 10, log: log.clone() }))
            .with(Arc::new(Terminal { log: log.clone() }))
            .with(Arc::new(Recorder { name: "b", priority: 150, log: log.clone() }))
            .build();

        pipeline.run(&mut chat_request()).await.unwrap();
        let entries = log.lock().unwrap().clone();
        assert_eq!(
            entries,
            vec!["enter:a", "enter:b", "enter:c", "call", "exit:c", "exit:b", "exit:a"]
        );
    }

    #[tokio::test]
    async fn test_stable_sort_among_equal_priorities() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::builder()
            .with(Arc::new(Recorder { name: "first", priority: 100, log: log.clone() }))
            .with(Arc::new(Recorder { name: "second", priority: 100, log: log.clone() }))
            .with(Arc::new(Terminal { log: log.clone() }))
            .build();

        pipeline.run(&mut chat_request()).await.unwrap();
        let entries = log.lock().unwrap().clone();
        assert_eq!(entries[0], "enter:first");
        assert_eq!(entries[1], "enter:second");
        assert_eq!(entries[3], "exit:second");
        assert_eq!(entries[4], "exit:first");
    }

    #[tokio::test]
    async fn test_response_phase_wraps_everything() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::builder()
            .with(Arc::new(Recorder { name: "inner", priority: 100, log: log.clone() }))
            .with(Arc::new(Recorder { name: "headers", priority: priority::RESPONSE_HEADERS, log: log.clone() }))
            .with(Arc::new(Recorder { name: "usage", priority: priority::USAGE, log: log.clone() }))
            .with(Arc::new(Terminal { log: log.clone() }))
            .build();

        pipeline.run(&mut chat_request()).await.unwrap();
        let entries = log.lock().unwrap().clone();
        assert_eq!(entries.first().map(String::as_str), Some("enter:usage"));
        assert_eq!(entries.get(1).map(String::as_str), Some("enter:headers"));
        assert_eq!(entries.last().map(String::as_str), Some("exit:usage"));
    }

    #[tokio::test]
    async fn test_short_circuit_skips_downstream() {
        struct ShortCircuit {
            log: Log,
        }

        #[async_trait::async_trait]
        impl Middleware for ShortCircuit {
            fn name(&self) -> &'static str {
                "short-circuit"
            }
            fn priority(&self) -> i32 {
                50
            }
            async fn process(
                &self,
                request: &mut PipelineRequest,
                _next: Next<'_>,
            ) -> Result<PipelineResponse, GatewayError> {
                self.log.lock().unwrap().push("short".to_string());
                Ok(PipelineResponse::Completion(test_response(request.model())))
            }
        }

        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::builder()
            .with(Arc::new(ShortCircuit { log: log.clone() }))
            .with(Arc::new(Recorder { name: "inner", priority: 100, log: log.clone() }))
            .with(Arc::new(Terminal { log: log.clone() }))
            .build();

        pipeline.run(&mut chat_request()).await.unwrap();
        let entries = log.lock().unwrap().clone();
        assert_eq!(entries, vec!["short"]);
    }

    #[tokio::test]
    async fn test_next_is_reinvocable() {
        struct Twice;

        #[async_trait::async_trait]
        impl Middleware for Twice {
            fn name(&self) -> &'static str {
                "twice"
            }
            fn priority(&self) -> i32 {
                50
            }
            async fn process(
                &self,
                request: &mut PipelineRequest,
                next: Next<'_>,
            ) -> Result<PipelineResponse, GatewayError> {
                let _ = next.run(request).await?;
                next.run(request).await
            }
        }

        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::builder()
            .with(Arc::new(Twice))
            .with(Arc::new(Terminal { log: log.clone() }))
            .build();

        pipeline.run(&mut chat_request()).await.unwrap();
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_chain_errors() {
        let pipeline = Pipeline::builder().build();
        let err = pipeline.run(&mut chat_request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::PipelineAborted { .. }));
    }
}
