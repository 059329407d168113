//! Minimal gateway assembly against a stub provider.
//!
//! Run with: cargo run --example gateway_demo

use async_trait::async_trait;
use nexus_gateway::config::{GatewayConfig, LogLevel};
use nexus_gateway::gateway::Gateway;
use nexus_models_sdk::error::ProviderError;
use nexus_models_sdk::models::*;
use nexus_models_sdk::providers::{Capabilities, Provider};
use nexus_models_sdk::streaming::{BoxCompletionStream, ReplayStream};
use std::sync::Arc;

struct EchoProvider;

#[async_trait]
impl Provider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::chat_only()
    }

    async fn models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        Ok(vec![ModelInfo {
            id: "echo-1".to_string(),
            provider: "echo".to_string(),
            context_window: Some(8192),
            input_cost_per_1k: None,
            output_cost_per_1k: None,
        }])
    }

    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let text = request
            .messages
            .last()
            .map(|m| m.content.flattened())
            .unwrap_or_default();
        Ok(ChatResponse {
            id: "chatcmpl-echo".to_string(),
            provider: "echo".to_string(),
            model: request.model,
            created: 0,
            choices: vec![Choice {
                index: 0,
                message: Message::assistant(format!("you said: {text}")),
                finish_reason: Some(FinishReason::Stop),
            }],
            usage: Some(Usage::new(8, 6)),
            latency_ms: 1,
            cost_usd: 0.0,
            cached: false,
            thinking: None,
            state: Default::default(),
        })
    }

    async fn complete_stream(
        &self,
        request: ChatRequest,
    ) -> Result<BoxCompletionStream, ProviderError> {
        let chunk = StreamChunk {
            id: "chatcmpl-echo".to_string(),
            provider: "echo".to_string(),
            model: request.model,
            delta: Delta {
                content: Some("echo".to_string()),
                ..Default::default()
            },
            finish_reason: Some(FinishReason::Stop),
        };
        Ok(Box::new(ReplayStream::new(vec![chunk], Some(Usage::new(8, 1)))))
    }

    async fn healthy(&self) -> bool {
        true
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    Gateway::init_tracing(LogLevel::Debug);

    let gateway = Gateway::builder(GatewayConfig::default())
        .with_provider(Arc::new(EchoProvider))
        .build()?;
    let engine = gateway.engine();

    let response = engine
        .complete(ChatRequest {
            model: "echo-1".to_string(),
            messages: vec![Message::user("hello gateway")],
            ..Default::default()
        })
        .await?;

    println!("{}", response.text().unwrap_or_default());
    println!("served by {} in {}ms", response.provider, response.latency_ms);
    Ok(())
}
