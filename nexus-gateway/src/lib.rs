//! # Nexus Gateway
//!
//! An embeddable AI gateway core: unified LLM requests run through a
//! priority-ordered middleware pipeline and dispatch to one of many
//! upstream providers, with tenants, API keys, quotas, and cost accounting
//! as first-class citizens.
//!
//! The HTTP surface, concrete vendor adapters, and durable persistence are
//! external collaborators; this crate exposes the [`engine::Engine`]
//! operations, the provider and store interfaces they implement, and the
//! [`gateway::Gateway`] assembly that wires everything from
//! [`config::GatewayConfig`].
//!
//! ```rust
//! use nexus_gateway::config::GatewayConfig;
//! use nexus_gateway::gateway::Gateway;
//!
//! let gateway = Gateway::builder(GatewayConfig::default())
//!     // .with_provider(Arc::new(MyProvider::new(...)))
//!     .build()
//!     .expect("default config is valid");
//! let engine = gateway.engine();
//! ```

pub mod config;
pub mod engine;
pub mod gateway;
pub mod gateway_error;
pub mod guards;
pub mod pipeline;
pub mod pricing;
pub mod rate_limit;
pub mod request_context;
pub mod services;
pub mod transforms;

pub use config::{GatewayConfig, LogLevel, OverflowPolicy};
pub use engine::Engine;
pub use gateway::{Gateway, GatewayBuilder};
pub use gateway_error::{ErrorBody, GatewayError};
pub use guards::{Guard, GuardPhase, GuardRegistry, StreamAction, StreamGuard, StreamScanMode};
pub use pipeline::{Middleware, Next, Pipeline, PipelineRequest, PipelineResponse, RequestKind};
pub use pricing::{ModelPricing, PricingTable};
pub use request_context::RequestContext;
pub use transforms::{Transform, TransformRegistry};

// The SDK types round-trip through every public signature here; re-export
// the crate so embedders depend on one name.
pub use nexus_models_sdk as sdk;
