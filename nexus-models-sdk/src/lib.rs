//! # Nexus Models SDK
//!
//! The provider-facing half of the Nexus AI gateway: unified model types,
//! the provider contract, and the machinery that turns a set of
//! heterogeneous upstream LLM services into one uniform surface.
//!
//! ## Modules
//!
//! - [`models`]: unified chat, streaming, and embedding types
//! - [`providers`]: the [`Provider`](providers::Provider) contract,
//!   capability record, and shared HTTP/SSE transport for adapters
//! - [`streaming`]: the lazy chunk iterator with deferred usage
//! - [`registry`]: insertion-ordered provider registry
//! - [`health`]: rolling success-rate and latency statistics
//! - [`routing`]: pluggable provider-selection strategies
//! - [`alias`]: tenant-scoped virtual model names
//! - [`cache`]: request fingerprinting, cache backends, single flight
//! - [`credentials`]: runtime secret lookup
//!
//! Concrete vendor adapters live out of tree; they implement
//! [`providers::Provider`] against their own wire protocol and register
//! with a [`registry::ProviderRegistry`]. The gateway crate composes the
//! pieces here into the request pipeline.
//!
//! ```rust
//! use nexus_models_sdk::registry::ProviderRegistry;
//! use nexus_models_sdk::routing::{Router, strategy_from_name};
//! use nexus_models_sdk::health::HealthTracker;
//! use std::sync::Arc;
//!
//! let registry = ProviderRegistry::new();
//! let health = Arc::new(HealthTracker::default());
//! let router = Router::new(strategy_from_name("priority").unwrap(), health);
//! ```

pub mod alias;
pub mod cache;
pub mod common;
pub mod credentials;
pub mod error;
pub mod health;
pub mod models;
pub mod providers;
pub mod registry;
pub mod routing;
pub mod streaming;

pub use alias::{AliasRegistry, AliasTarget};
pub use cache::{fingerprint, CachedResponse, DistributedCache, InMemoryCache, ResponseCache, SingleFlight};
pub use credentials::{CredentialProvider, EnvCredentials, StaticCredentials};
pub use error::ProviderError;
pub use health::{HealthSnapshot, HealthTracker};
pub use models::{
    ChatRequest, ChatResponse, Choice, Delta, EmbeddingInput, EmbeddingRequest, EmbeddingResponse,
    FinishReason, Message, MessageContent, ModelInfo, Role, StreamChunk, Tool, ToolCall, Usage,
};
pub use providers::{Capabilities, Provider, ProviderConfig};
pub use registry::ProviderRegistry;
pub use routing::{Candidate, Router, RoutingError, Strategy};
pub use streaming::{BoxCompletionStream, CompletionStream, ReplayStream, SseStream};
