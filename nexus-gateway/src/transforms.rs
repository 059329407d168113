//! # Request and Response Transforms
//!
//! An ordered registry of mutators applied around the provider call: input
//! transforms rewrite the request on the way in, output transforms rewrite
//! the response on the way out with the original request still available
//! for context. A transform failure aborts the request. Transforms must be
//! pure with respect to external state.

use async_trait::async_trait;
use nexus_models_sdk::models::{ChatRequest, ChatResponse, Message, MessageContent, Role};
use std::sync::Arc;

use crate::gateway_error::GatewayError;

/// One mutator in the transform chain.
#[async_trait]
pub trait Transform: Send + Sync {
    fn name(&self) -> &str;

    /// Rewrite the request before dispatch. The default is a no-op.
    async fn apply_input(&self, _request: &mut ChatRequest) -> Result<(), GatewayError> {
        Ok(())
    }

    /// Rewrite the response after dispatch. `request` is the original
    /// pre-transform request. The default is a no-op.
    async fn apply_output(
        &self,
        _request: &ChatRequest,
        _response: &mut ChatResponse,
    ) -> Result<(), GatewayError> {
        Ok(())
    }
}

/// Ordered transform chain.
#[derive(Default, Clone)]
pub struct TransformRegistry {
    transforms: Vec<Arc<dyn Transform>>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, transform: Arc<dyn Transform>) {
        self.transforms.push(transform);
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    pub async fn apply_input(&self, request: &mut ChatRequest) -> Result<(), GatewayError> {
        for transform in &self.transforms {
            transform.apply_input(request).await?;
        }
        Ok(())
    }

    pub async fn apply_output(
        &self,
        request: &ChatRequest,
        response: &mut ChatResponse,
    ) -> Result<(), GatewayError> {
        for transform in &self.transforms {
            transform.apply_output(request, response).await?;
        }
        Ok(())
    }
}

/// Prepends a system prompt when the request carries none.
pub struct SystemPromptInjector {
    prompt: String,
}

impl SystemPromptInjector {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }
}

#[async_trait]
impl Transform for SystemPromptInjector {
    fn name(&self) -> &str {
        "system_prompt_injector"
    }

    async fn apply_input(&self, request: &mut ChatRequest) -> Result<(), GatewayError> {
        let has_system = request.system.is_some()
            || request.messages.iter().any(|m| m.role == Role::System);
        if !has_system {
            request.messages.insert(0, Message::system(self.prompt.clone()));
        }
        Ok(())
    }
}

/// Strips whitespace padding from response text, normalizing ragged
/// provider output.
pub struct OutputTrimmer;

#[async_trait]
impl Transform for OutputTrimmer {
    fn name(&self) -> &str {
        "output_trimmer"
    }

    async fn apply_output(
        &self,
        _request: &ChatRequest,
        response: &mut ChatResponse,
    ) -> Result<(), GatewayError> {
        for choice in &mut response.choices {
            if let MessageContent::Text(text) = &choice.message.content {
                let trimmed = text.trim();
                if trimmed.len() != text.len() {
                    choice.message.content = MessageContent::Text(trimmed.to_string());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_models_sdk::models::Choice;
    use std::collections::HashMap;

    fn response(text: &str) -> ChatResponse {
        ChatResponse {
            id: "chatcmpl-1".to_string(),
            provider: "test".to_string(),
            model: "test-model".to_string(),
            created: 0,
            choices: vec![Choice {
                index: 0,
                message: Message::assistant(text),
                finish_reason: None,
            }],
            usage: None,
            latency_ms: 1,
            cost_usd: 0.0,
            cached: false,
            thinking: None,
            state: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_system_prompt_injected_once() {
        let mut registry = TransformRegistry::new();
        registry.register(Arc::new(SystemPromptInjector::new("Be terse.")));

        let mut request = ChatRequest {
            messages: vec![Message::user("hi")],
            ..Default::default()
        };
        registry.apply_input(&mut request).await.unwrap();
        assert_eq!(request.messages[0].role, Role::System);

        // A request that already carries a system message is untouched.
        let mut with_system = ChatRequest {
            messages: vec![Message::system("existing"), Message::user("hi")],
            ..Default::default()
        };
        registry.apply_input(&mut with_system).await.unwrap();
        assert_eq!(with_system.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_output_trimmer() {
        let mut registry = TransformRegistry::new();
        registry.register(Arc::new(OutputTrimmer));

        let request = ChatRequest::default();
        let mut resp = response("  padded  \n");
        registry.apply_output(&request, &mut resp).await.unwrap();
        assert_eq!(resp.text(), Some("padded"));
    }

    #[tokio::test]
    async fn test_transforms_run_in_registration_order() {
        struct Tag(&'static str);

        #[async_trait]
        impl Transform for Tag {
            fn name(&self) -> &str {
                self.0
            }
            async fn apply_input(&self, request: &mut ChatRequest) -> Result<(), GatewayError> {
                request
                    .metadata
                    .entry("order".to_string())
                    .and_modify(|v| {
                        v.push(',');
                        v.push_str(self.0);
                    })
                    .or_insert_with(|| self.0.to_string());
                Ok(())
            }
        }

        let mut registry = TransformRegistry::new();
        registry.register(Arc::new(Tag("first")));
        registry.register(Arc::new(Tag("second")));

        let mut request = ChatRequest::default();
        registry.apply_input(&mut request).await.unwrap();
        assert_eq!(request.metadata["order"], "first,second");
    }
}
