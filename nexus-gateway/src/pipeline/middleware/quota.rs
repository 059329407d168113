//! Quota gate: tenant status, model allow-lists, rate and spend limits.
//!
//! Runs before any guard or upstream work. Rejections originating here are
//! `TenantNotFound`, `TenantDisabled`, `ModelNotSupported`, `QuotaExceeded`,
//! `BudgetExceeded`, and `RateLimited`. Requests without a tenant only pass
//! the global rate limit.

use std::sync::Arc;

use crate::gateway_error::GatewayError;
use crate::pipeline::{
    priority, Middleware, Next, PipelineRequest, PipelineResponse, RequestKind,
    STATE_CACHE_DISABLED, STATE_ROUTING_STRATEGY,
};
use crate::pricing::PricingTable;
use crate::rate_limit::RateLimiter;
use crate::services::{TenantService, UsageService};

const GLOBAL_KEY: &str = "global";

pub struct QuotaMiddleware {
    tenants: TenantService,
    usage: UsageService,
    limiter: Arc<RateLimiter>,
    global_rate_limit: u32,
    pricing: PricingTable,
}

impl QuotaMiddleware {
    pub fn new(
        tenants: TenantService,
        usage: UsageService,
        limiter: Arc<RateLimiter>,
        global_rate_limit: u32,
        pricing: PricingTable,
    ) -> Self {
        Self {
            tenants,
            usage,
            limiter,
            global_rate_limit,
            pricing,
        }
    }
}

#[async_trait::async_trait]
impl Middleware for QuotaMiddleware {
    fn name(&self) -> &'static str {
        "quota"
    }

    fn priority(&self) -> i32 {
        priority::QUOTA
    }

    async fn process(
        &self,
        request: &mut PipelineRequest,
        next: Next<'_>,
    ) -> Result<PipelineResponse, GatewayError> {
        if !self.limiter.try_acquire(GLOBAL_KEY, self.global_rate_limit) {
            return Err(GatewayError::RateLimited);
        }

        let Some(tenant_id) = request.context.tenant_id.clone() else {
            return next.run(request).await;
        };

        let tenant = self.tenants.get(&tenant_id).await?;
        if !tenant.is_active() {
            return Err(GatewayError::TenantDisabled { tenant: tenant_id });
        }

        if request.model().is_empty() {
            if let Some(default_model) = tenant.config.default_model.clone() {
                match &mut request.kind {
                    RequestKind::Complete(chat) | RequestKind::Stream(chat) => {
                        chat.model = default_model;
                    }
                    RequestKind::Embed(embed) => embed.model = default_model,
                }
            }
        }

        let model = request.model().to_string();
        if !tenant.allows_model(&model) {
            return Err(GatewayError::ModelNotSupported { model });
        }

        let estimated_tokens = request.chat().map(|c| c.estimated_tokens()).unwrap_or(0);
        let quota = tenant.quota;

        if quota.max_tokens_per_request > 0 && estimated_tokens > quota.max_tokens_per_request {
            return Err(GatewayError::QuotaExceeded {
                message: format!(
                    "request estimated at {estimated_tokens} tokens exceeds the per-request cap of {}",
                    quota.max_tokens_per_request
                ),
            });
        }

        if quota.rpm > 0 && !self.limiter.try_acquire(&format!("tenant:{tenant_id}"), quota.rpm) {
            return Err(GatewayError::QuotaExceeded {
                message: format!("tenant exceeded {} requests per minute", quota.rpm),
            });
        }

        if quota.daily_requests > 0 {
            let used = self.usage.daily_requests(&tenant_id).await?;
            if used >= quota.daily_requests as u64 {
                return Err(GatewayError::QuotaExceeded {
                    message: format!("tenant exhausted its daily cap of {} requests", quota.daily_requests),
                });
            }
        }

        if quota.monthly_budget_usd > 0.0 {
            let spent = self.usage.monthly_spend(&tenant_id).await?;
            let upcoming = self.pricing.estimate(&model, estimated_tokens);
            if spent + upcoming > quota.monthly_budget_usd {
                return Err(GatewayError::BudgetExceeded {
                    message: format!(
                        "spend of ${spent:.2} plus an estimated ${upcoming:.2} exceeds the ${:.2} monthly budget",
                        quota.monthly_budget_usd
                    ),
                });
            }
        }

        if tenant.config.enable_cache == Some(false) {
            request
                .state
                .insert(STATE_CACHE_DISABLED.to_string(), serde_json::Value::Bool(true));
        }
        if let Some(strategy) = tenant.config.routing_strategy.clone() {
            request.state.insert(
                STATE_ROUTING_STRATEGY.to_string(),
                serde_json::Value::String(strategy),
            );
        }

        next.run(request).await
    }
}
