//! # Gateway Assembly
//!
//! Owns every component instance and wires the pipeline from configuration.
//! The builder injects providers, stores, guards, transforms, and a
//! credential source; `build` composes the middleware chain according to
//! the config flags and hands back a [`Gateway`] exposing the [`Engine`].

use nexus_models_sdk::alias::AliasRegistry;
use nexus_models_sdk::cache::{InMemoryCache, ResponseCache};
use nexus_models_sdk::credentials::CredentialProvider;
use nexus_models_sdk::health::HealthTracker;
use nexus_models_sdk::providers::Provider;
use nexus_models_sdk::registry::ProviderRegistry;
use nexus_models_sdk::routing::{strategy_from_name, Router, Strategy};
use std::sync::Arc;

use crate::config::{GatewayConfig, LogLevel};
use crate::engine::Engine;
use crate::gateway_error::GatewayError;
use crate::guards::{GuardRegistry, StreamGuard, StreamScanMode};
use crate::pipeline::middleware::{
    AliasMiddleware, CacheMiddleware, GuardrailMiddleware, ProviderCallMiddleware,
    QuotaMiddleware, ResponseHeadersMiddleware, RetryMiddleware, StreamGuardMiddleware,
    TimeoutMiddleware, TokenCountingMiddleware, ToolExecutor, ToolLoopMiddleware,
    TracingMiddleware, TransformMiddleware, UsageTrackingMiddleware,
};
use crate::pipeline::Pipeline;
use crate::pricing::PricingTable;
use crate::rate_limit::RateLimiter;
use crate::services::{
    InMemoryKeyStore, InMemoryTenantStore, InMemoryUsageStore, KeyService, KeyStore,
    TenantService, TenantStore, UsageService, UsageStore,
};
use crate::transforms::TransformRegistry;

/// Builder for [`Gateway`].
pub struct GatewayBuilder {
    config: GatewayConfig,
    providers: Vec<Arc<dyn Provider>>,
    tenant_store: Option<Arc<dyn TenantStore>>,
    key_store: Option<Arc<dyn KeyStore>>,
    usage_store: Option<Arc<dyn UsageStore>>,
    cache: Option<Arc<dyn ResponseCache>>,
    guards: GuardRegistry,
    stream_guards: Vec<Arc<dyn StreamGuard>>,
    stream_scan_mode: StreamScanMode,
    transforms: TransformRegistry,
    credentials: Option<Arc<dyn CredentialProvider>>,
    tool_executor: Option<Arc<dyn ToolExecutor>>,
    pricing: PricingTable,
    strategy: Option<Box<dyn Strategy>>,
}

impl GatewayBuilder {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            providers: Vec::new(),
            tenant_store: None,
            key_store: None,
            usage_store: None,
            cache: None,
            guards: GuardRegistry::new(),
            stream_guards: Vec::new(),
            stream_scan_mode: StreamScanMode::Accumulate { window_chars: 1024 },
            transforms: TransformRegistry::new(),
            credentials: None,
            tool_executor: None,
            pricing: PricingTable::new(),
            strategy: None,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn with_tenant_store(mut self, store: Arc<dyn TenantStore>) -> Self {
        self.tenant_store = Some(store);
        self
    }

    pub fn with_key_store(mut self, store: Arc<dyn KeyStore>) -> Self {
        self.key_store = Some(store);
        self
    }

    pub fn with_usage_store(mut self, store: Arc<dyn UsageStore>) -> Self {
        self.usage_store = Some(store);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_guards(mut self, guards: GuardRegistry) -> Self {
        self.guards = guards;
        self
    }

    pub fn with_stream_guard(mut self, guard: Arc<dyn StreamGuard>) -> Self {
        self.stream_guards.push(guard);
        self
    }

    pub fn with_stream_scan_mode(mut self, mode: StreamScanMode) -> Self {
        self.stream_scan_mode = mode;
        self
    }

    pub fn with_transforms(mut self, transforms: TransformRegistry) -> Self {
        self.transforms = transforms;
        self
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_tool_executor(mut self, executor: Arc<dyn ToolExecutor>) -> Self {
        self.tool_executor = Some(executor);
        self
    }

    pub fn with_pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = pricing;
        self
    }

    /// Override the routing strategy instead of resolving it by name from
    /// the config.
    pub fn with_strategy(mut self, strategy: Box<dyn Strategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn build(self) -> Result<Gateway, GatewayError> {
        self.config.validate()?;

        let registry = Arc::new(ProviderRegistry::new());
        for provider in self.providers {
            registry.register(provider);
        }

        let health = Arc::new(HealthTracker::default());
        let strategy = match self.strategy {
            Some(strategy) => strategy,
            None => strategy_from_name(&self.config.routing_strategy).ok_or_else(|| {
                GatewayError::Configuration {
                    message: format!("unknown routing strategy: {}", self.config.routing_strategy),
                }
            })?,
        };
        let router = Arc::new(Router::new(strategy, Arc::clone(&health)));

        let aliases = Arc::new(AliasRegistry::new());
        for entry in &self.config.aliases {
            aliases.register(entry.tenant.as_deref(), &entry.name, entry.targets.clone());
        }

        let cache: Arc<dyn ResponseCache> = self
            .cache
            .unwrap_or_else(|| Arc::new(InMemoryCache::new(self.config.cache_capacity)));

        let tenant_store = self
            .tenant_store
            .unwrap_or_else(|| Arc::new(InMemoryTenantStore::new()));
        let key_store = self
            .key_store
            .unwrap_or_else(|| Arc::new(InMemoryKeyStore::new()));
        let usage_store = self
            .usage_store
            .unwrap_or_else(|| Arc::new(InMemoryUsageStore::new()));

        let tenants = TenantService::new(tenant_store);
        let keys = KeyService::new(key_store);
        let usage = UsageService::new(usage_store);
        let limiter = Arc::new(RateLimiter::per_minute());

        let mut builder = Pipeline::builder()
            .with(Arc::new(TracingMiddleware))
            .with(Arc::new(TimeoutMiddleware::new(self.config.default_timeout)))
            .with(Arc::new(QuotaMiddleware::new(
                tenants.clone(),
                usage.clone(),
                Arc::clone(&limiter),
                self.config.global_rate_limit,
                self.pricing.clone(),
            )))
            .with(Arc::new(GuardrailMiddleware::new(self.guards.clone())))
            .with(Arc::new(StreamGuardMiddleware::new(
                self.stream_guards.clone(),
                self.stream_scan_mode,
            )))
            .with(Arc::new(TransformMiddleware::new(self.transforms.clone())))
            .with(Arc::new(TokenCountingMiddleware::new(
                self.config.overflow_policy,
                self.config.default_context_window,
                self.config.context_windows.clone(),
            )))
            .with(Arc::new(AliasMiddleware::new(Arc::clone(&aliases))))
            .with(Arc::new(ProviderCallMiddleware::new(
                Arc::clone(&registry),
                Arc::clone(&router),
                self.config.provider_costs(),
            )))
            .with(Arc::new(ResponseHeadersMiddleware));

        if self.config.enable_cache {
            builder = builder.with(Arc::new(CacheMiddleware::new(
                Arc::clone(&cache),
                self.config.cache_ttl,
            )));
        }
        if let Some(executor) = self.tool_executor {
            builder = builder.with(Arc::new(ToolLoopMiddleware::new(executor)));
        }
        if self.config.default_max_retries > 0 {
            builder = builder.with(Arc::new(RetryMiddleware::new(
                self.config.default_max_retries,
                self.config.retry_delay,
                self.config.retry_backoff,
            )));
        }
        if self.config.enable_usage {
            builder = builder.with(Arc::new(UsageTrackingMiddleware::new(
                usage.clone(),
                self.pricing.clone(),
            )));
        }

        let pipeline = Arc::new(builder.build());

        Ok(Gateway {
            config: self.config,
            registry,
            health,
            router,
            aliases,
            cache,
            tenants,
            keys,
            usage,
            credentials: self.credentials,
            pipeline,
        })
    }
}

/// The assembled gateway. Owns every component and their lifecycles;
/// middlewares borrow them for the duration of a request.
pub struct Gateway {
    config: GatewayConfig,
    registry: Arc<ProviderRegistry>,
    health: Arc<HealthTracker>,
    router: Arc<Router>,
    aliases: Arc<AliasRegistry>,
    cache: Arc<dyn ResponseCache>,
    tenants: TenantService,
    keys: KeyService,
    usage: UsageService,
    credentials: Option<Arc<dyn CredentialProvider>>,
    pipeline: Arc<Pipeline>,
}

impl Gateway {
    pub fn builder(config: GatewayConfig) -> GatewayBuilder {
        GatewayBuilder::new(config)
    }

    /// Assemble with defaults from configuration alone. Providers are
    /// injected via the builder; this is the convenience entry point for
    /// config-first setups.
    pub fn from_config(config: GatewayConfig) -> Result<Self, GatewayError> {
        GatewayBuilder::new(config).build()
    }

    /// Install the tracing subscriber for the configured verbosity.
    /// `RUST_LOG` wins when set. Safe to call more than once.
    pub fn init_tracing(level: LogLevel) {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.as_filter()));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    }

    pub fn engine(&self) -> Engine {
        Engine::new(Arc::clone(&self.pipeline), Arc::clone(&self.registry))
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn health(&self) -> &Arc<HealthTracker> {
        &self.health
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn aliases(&self) -> &Arc<AliasRegistry> {
        &self.aliases
    }

    pub fn cache(&self) -> &Arc<dyn ResponseCache> {
        &self.cache
    }

    pub fn tenants(&self) -> &TenantService {
        &self.tenants
    }

    pub fn keys(&self) -> &KeyService {
        &self.keys
    }

    pub fn usage(&self) -> &UsageService {
        &self.usage
    }

    pub fn credentials(&self) -> Option<&Arc<dyn CredentialProvider>> {
        self.credentials.as_ref()
    }

    /// Count of registered providers, as reported by the health endpoint of
    /// the external HTTP surface.
    pub fn provider_count(&self) -> usize {
        self.registry.len()
    }
}
