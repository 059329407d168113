//! Token counting middleware: estimates request tokens and applies the
//! configured context-window overflow policy.

use nexus_models_sdk::models::{Message, Role};
use std::collections::HashMap;

use crate::config::OverflowPolicy;
use crate::gateway_error::GatewayError;
use crate::pipeline::{priority, Middleware, Next, PipelineRequest, PipelineResponse};

pub struct TokenCountingMiddleware {
    policy: OverflowPolicy,
    default_window: u32,
    windows: HashMap<String, u32>,
}

impl TokenCountingMiddleware {
    pub fn new(policy: OverflowPolicy, default_window: u32, windows: HashMap<String, u32>) -> Self {
        Self {
            policy,
            default_window,
            windows,
        }
    }

    fn window_for(&self, model: &str) -> u32 {
        self.windows.get(model).copied().unwrap_or(self.default_window)
    }
}

/// Keep the first system message and the last two conversational turns.
fn truncate_oldest(messages: &mut Vec<Message>) {
    let system = messages.iter().find(|m| m.role == Role::System).cloned();
    let turns: Vec<Message> = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .cloned()
        .collect();
    let keep_from = turns.len().saturating_sub(2);

    let mut kept = Vec::with_capacity(3);
    kept.extend(system);
    kept.extend(turns[keep_from..].iter().cloned());
    *messages = kept;
}

/// Keep the first two and the last two messages.
fn truncate_middle(messages: &mut Vec<Message>) {
    if messages.len() <= 4 {
        return;
    }
    let mut kept = messages[..2].to_vec();
    kept.extend(messages[messages.len() - 2..].iter().cloned());
    *messages = kept;
}

#[async_trait::async_trait]
impl Middleware for TokenCountingMiddleware {
    fn name(&self) -> &'static str {
        "token_counting"
    }

    fn priority(&self) -> i32 {
        priority::TOKEN_COUNTING
    }

    async fn process(
        &self,
        request: &mut PipelineRequest,
        next: Next<'_>,
    ) -> Result<PipelineResponse, GatewayError> {
        let window = self.window_for(request.model());
        if let Some(chat) = request.chat_mut() {
            let estimated = chat.estimated_tokens();
            if estimated > window {
                match self.policy {
                    OverflowPolicy::Error => {
                        return Err(GatewayError::ContextOverflow { estimated, window });
                    }
                    OverflowPolicy::TruncateOldest => {
                        truncate_oldest(&mut chat.messages);
                        tracing::debug!(estimated, window, "truncated oldest turns to fit context window");
                    }
                    OverflowPolicy::TruncateMiddle => {
                        truncate_middle(&mut chat.messages);
                        tracing::debug!(estimated, window, "truncated middle turns to fit context window");
                    }
                }
            }
        }
        next.run(request).await
    }
}
