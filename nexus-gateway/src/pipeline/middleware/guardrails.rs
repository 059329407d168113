//! Guardrail middlewares: input and output inspection around the call, and
//! stream-guard interposition on the returned stream.

use nexus_models_sdk::models::Message;
use std::sync::Arc;

use crate::gateway_error::GatewayError;
use crate::guards::{GuardPhase, GuardRegistry, GuardedStream, StreamGuard, StreamScanMode};
use crate::pipeline::{priority, Middleware, Next, PipelineRequest, PipelineResponse};

/// Runs input guards before dispatch and output guards over the produced
/// response. Blocking aborts the request with `ContentBlocked`.
pub struct GuardrailMiddleware {
    guards: GuardRegistry,
}

impl GuardrailMiddleware {
    pub fn new(guards: GuardRegistry) -> Self {
        Self { guards }
    }
}

#[async_trait::async_trait]
impl Middleware for GuardrailMiddleware {
    fn name(&self) -> &'static str {
        "guardrail"
    }

    fn priority(&self) -> i32 {
        priority::INPUT_GUARD
    }

    async fn process(
        &self,
        request: &mut PipelineRequest,
        next: Next<'_>,
    ) -> Result<PipelineResponse, GatewayError> {
        if self.guards.is_empty() {
            return next.run(request).await;
        }

        if let Some(chat) = request.chat_mut() {
            if let Some(rewritten) = self.guards.run(GuardPhase::Input, &chat.messages).await? {
                chat.messages = rewritten;
            }
        }

        let mut response = next.run(request).await?;

        if let Some(completion) = response.completion_mut() {
            let produced: Vec<Message> =
                completion.choices.iter().map(|c| c.message.clone()).collect();
            if let Some(rewritten) = self.guards.run(GuardPhase::Output, &produced).await? {
                for (choice, message) in completion.choices.iter_mut().zip(rewritten) {
                    choice.message = message;
                }
            }
        }

        Ok(response)
    }
}

/// Wraps the returned stream in a [`GuardedStream`] so chunk inspection
/// happens as the consumer reads.
pub struct StreamGuardMiddleware {
    guards: Vec<Arc<dyn StreamGuard>>,
    mode: StreamScanMode,
}

impl StreamGuardMiddleware {
    pub fn new(guards: Vec<Arc<dyn StreamGuard>>, mode: StreamScanMode) -> Self {
        Self { guards, mode }
    }
}

#[async_trait::async_trait]
impl Middleware for StreamGuardMiddleware {
    fn name(&self) -> &'static str {
        "stream_guardrail"
    }

    fn priority(&self) -> i32 {
        priority::STREAM_GUARD
    }

    async fn process(
        &self,
        request: &mut PipelineRequest,
        next: Next<'_>,
    ) -> Result<PipelineResponse, GatewayError> {
        if !request.is_stream() || self.guards.is_empty() {
            return next.run(request).await;
        }

        match next.run(request).await? {
            PipelineResponse::Stream(inner) => Ok(PipelineResponse::Stream(Box::new(
                GuardedStream::new(inner, self.guards.clone(), self.mode),
            ))),
            other => Ok(other),
        }
    }
}
