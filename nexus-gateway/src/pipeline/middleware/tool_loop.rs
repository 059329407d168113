//! Tool loop middleware: optional multi-turn tool execution.
//!
//! By default provider tool calls pass straight through to the caller. When
//! an executor is installed, this middleware feeds each tool call to it,
//! appends the assistant turn and the tool results to the conversation, and
//! re-invokes the downstream chain, bounded by an iteration cap.

use nexus_models_sdk::models::{FinishReason, Message, ToolCall};
use std::sync::Arc;

use crate::gateway_error::GatewayError;
use crate::pipeline::{priority, Middleware, Next, PipelineRequest, PipelineResponse, RequestKind};

/// Executes one tool call and returns its textual result.
#[async_trait::async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, call: &ToolCall) -> Result<String, GatewayError>;
}

pub struct ToolLoopMiddleware {
    executor: Arc<dyn ToolExecutor>,
    max_iterations: usize,
}

impl ToolLoopMiddleware {
    pub fn new(executor: Arc<dyn ToolExecutor>) -> Self {
        Self {
            executor,
            max_iterations: 4,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }
}

fn pending_tool_calls(response: &PipelineResponse) -> Option<Vec<ToolCall>> {
    let completion = response.completion()?;
    let choice = completion.choices.first()?;
    if choice.finish_reason != Some(FinishReason::ToolCalls) {
        return None;
    }
    choice.message.tool_calls.clone().filter(|calls| !calls.is_empty())
}

#[async_trait::async_trait]
impl Middleware for ToolLoopMiddleware {
    fn name(&self) -> &'static str {
        "tool_loop"
    }

    fn priority(&self) -> i32 {
        priority::TOOL_LOOP
    }

    async fn process(
        &self,
        request: &mut PipelineRequest,
        next: Next<'_>,
    ) -> Result<PipelineResponse, GatewayError> {
        if !matches!(request.kind, RequestKind::Complete(_)) {
            return next.run(request).await;
        }

        let mut response = next.run(request).await?;
        let mut iterations = 0;

        while let Some(calls) = pending_tool_calls(&response) {
            if iterations >= self.max_iterations {
                tracing::warn!(iterations, "tool loop iteration cap reached, returning tool calls to caller");
                break;
            }
            iterations += 1;

            let assistant_turn = response
                .completion()
                .and_then(|c| c.choices.first())
                .map(|c| c.message.clone())
                .expect("tool calls imply a first choice");

            let mut results = Vec::with_capacity(calls.len());
            for call in &calls {
                let output = self.executor.execute(call).await?;
                results.push(Message::tool(call.id.clone(), output));
            }

            if let Some(chat) = request.chat_mut() {
                chat.messages.push(assistant_turn);
                chat.messages.extend(results);
            }
            response = next.run(request).await?;
        }

        Ok(response)
    }
}
