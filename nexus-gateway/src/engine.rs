//! # Engine
//!
//! Typed facade over the pipeline: one method per request kind, plus the
//! aggregate model catalog. This is the surface an embedding application
//! (or the OpenAI-compatible HTTP layer) calls.

use nexus_models_sdk::models::{
    ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse, ModelInfo,
};
use nexus_models_sdk::registry::ProviderRegistry;
use nexus_models_sdk::streaming::BoxCompletionStream;
use std::sync::Arc;

use crate::gateway_error::GatewayError;
use crate::pipeline::{Pipeline, PipelineRequest};

/// Thin typed facade over the composed pipeline.
#[derive(Clone)]
pub struct Engine {
    pipeline: Arc<Pipeline>,
    registry: Arc<ProviderRegistry>,
}

impl Engine {
    pub fn new(pipeline: Arc<Pipeline>, registry: Arc<ProviderRegistry>) -> Self {
        Self { pipeline, registry }
    }

    /// Run a chat completion through the pipeline.
    pub async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, GatewayError> {
        let mut pipeline_request = PipelineRequest::completion(request);
        self.pipeline
            .run(&mut pipeline_request)
            .await?
            .into_completion()
    }

    /// Run a streaming chat completion. The stream holds upstream resources
    /// until drained or closed.
    pub async fn complete_stream(
        &self,
        mut request: ChatRequest,
    ) -> Result<BoxCompletionStream, GatewayError> {
        request.stream = Some(true);
        let mut pipeline_request = PipelineRequest::streaming(request);
        self.pipeline.run(&mut pipeline_request).await?.into_stream()
    }

    /// Run an embedding request.
    pub async fn embed(
        &self,
        request: EmbeddingRequest,
    ) -> Result<EmbeddingResponse, GatewayError> {
        let mut pipeline_request = PipelineRequest::embedding(request);
        self.pipeline
            .run(&mut pipeline_request)
            .await?
            .into_embedding()
    }

    /// Aggregate model catalogs across all registered providers, in
    /// registry order. A provider whose catalog fails is skipped.
    pub async fn list_models(&self) -> Vec<ModelInfo> {
        let mut models = Vec::new();
        for provider in self.registry.all() {
            match provider.models().await {
                Ok(mut catalog) => models.append(&mut catalog),
                Err(err) => {
                    tracing::warn!(provider = provider.name(), error = %err, "failed to list models");
                }
            }
        }
        models
    }

    /// Look up one model by id across all catalogs.
    pub async fn get_model(&self, id: &str) -> Option<ModelInfo> {
        self.list_models().await.into_iter().find(|m| m.id == id)
    }
}
