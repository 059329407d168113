//! # Provider Contract
//!
//! The uniform interface every upstream LLM adapter implements. The gateway
//! never talks to a vendor wire protocol directly; adapters normalize their
//! upstream into the unified request, response, and stream shapes and the
//! rest of the system treats all of them alike.
//!
//! ## Overview
//!
//! - [`Provider`]: identity, capabilities, model catalog, the four
//!   operations (complete, stream, embed, health probe)
//! - [`Capabilities`]: boolean feature record with canonical names
//! - [`ProviderConfig`]: the configuration record handed to adapter
//!   constructors
//! - [`http_client`]: shared HTTP transport plumbing for adapters
//!
//! ## Normalization contract
//!
//! Adapters are responsible for:
//!
//! - folding system messages into whichever field the upstream prefers
//! - mapping finish reasons onto the canonical set, passing unknown codes
//!   through verbatim
//! - parsing upstream stream frames into one [`StreamChunk`] per semantic
//!   delta, skipping blanks and comments, and setting terminal usage
//! - canonicalizing tool calls to `(id, "function", {name, arguments})`
//!
//! ## Implementing a provider
//!
//! ```rust
//! use async_trait::async_trait;
//! use nexus_models_sdk::error::ProviderError;
//! use nexus_models_sdk::models::*;
//! use nexus_models_sdk::providers::{Capabilities, Provider};
//! use nexus_models_sdk::streaming::BoxCompletionStream;
//!
//! struct MyProvider;
//!
//! #[async_trait]
//! impl Provider for MyProvider {
//!     fn name(&self) -> &str { "my-provider" }
//!     fn capabilities(&self) -> Capabilities { Capabilities::chat_only() }
//!     async fn models(&self) -> Result<Vec<ModelInfo>, ProviderError> { Ok(vec![]) }
//!     async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
//!         todo!("call the upstream API")
//!     }
//!     async fn complete_stream(&self, request: ChatRequest) -> Result<BoxCompletionStream, ProviderError> {
//!         todo!("open the upstream stream")
//!     }
//!     async fn healthy(&self) -> bool { true }
//! }
//! ```

use crate::common::duration_serde;
use crate::error::ProviderError;
use crate::models::{ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse, ModelInfo};
use crate::streaming::BoxCompletionStream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub mod http_client;

/// Canonical capability names accepted by [`Capabilities::supports`].
pub const CAPABILITY_NAMES: &[&str] = &[
    "chat", "streaming", "embeddings", "vision", "tools", "json", "thinking", "images", "audio",
    "batch",
];

/// Boolean feature record for a provider.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Capabilities {
    pub chat: bool,
    pub streaming: bool,
    pub embeddings: bool,
    pub vision: bool,
    pub tools: bool,
    pub json: bool,
    pub thinking: bool,
    pub images: bool,
    pub audio: bool,
    pub batch: bool,
}

impl Capabilities {
    /// A minimal chat-and-streaming capability set.
    pub fn chat_only() -> Self {
        Self {
            chat: true,
            streaming: true,
            ..Default::default()
        }
    }

    /// Look up a capability by its canonical name. Unknown names are not
    /// supported by definition.
    pub fn supports(&self, name: &str) -> bool {
        match name {
            "chat" => self.chat,
            "streaming" => self.streaming,
            "embeddings" => self.embeddings,
            "vision" => self.vision,
            "tools" => self.tools,
            "json" => self.json,
            "thinking" => self.thinking,
            "images" => self.images,
            "audio" => self.audio,
            "batch" => self.batch,
            _ => false,
        }
    }
}

/// Trait implemented by every upstream LLM adapter.
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    /// Stable identifier, lowercase ASCII.
    fn name(&self) -> &str;

    /// Feature record for capability-based filtering.
    fn capabilities(&self) -> Capabilities;

    /// The model catalog. Adapters may fetch lazily and cache.
    async fn models(&self) -> Result<Vec<ModelInfo>, ProviderError>;

    /// Perform a chat completion. The adapter reports its own name in the
    /// response and populates the measured latency.
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError>;

    /// Open a streaming chat completion. The returned stream holds the
    /// transport until drained or closed.
    async fn complete_stream(
        &self,
        request: ChatRequest,
    ) -> Result<BoxCompletionStream, ProviderError>;

    /// Generate embeddings. Providers without embedding support return the
    /// not-supported sentinel, never a partial success.
    async fn embed(&self, _request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        Err(ProviderError::NotSupported {
            feature: "embeddings".to_string(),
        })
    }

    /// Connectivity probe. An endpoint that is reachable but rejects the
    /// credential is still up; only connect-level failures are unhealthy.
    async fn healthy(&self) -> bool;
}

/// Configuration record for provider instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider name, lowercase ASCII.
    pub name: String,
    /// Static API key. Empty when the adapter pulls from a
    /// [`crate::credentials::CredentialProvider`] at request time.
    #[serde(default)]
    pub api_key: String,
    /// Optional base URL override.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Request timeout.
    #[serde(with = "duration_serde", default = "default_timeout")]
    pub timeout: Duration,
    /// Custom HTTP headers to include in every request.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Whether this provider participates in routing.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Blended per-token cost hint in USD, used by cost-optimized routing
    /// when the catalog has no per-model pricing.
    #[serde(default)]
    pub cost_per_token: Option<f64>,
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_enabled() -> bool {
    true
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            api_key: api_key.into(),
            base_url: None,
            timeout: default_timeout(),
            headers: HashMap::new(),
            enabled: true,
            cost_per_token: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}
