//! Alias middleware: resolves virtual model names to concrete targets.
//!
//! On a hit, one target is picked by weighted random draw, the original
//! name and chosen provider land in request state, and the model field is
//! rewritten. A miss is not an error; the literal model name flows on.

use nexus_models_sdk::alias::{pick_weighted, AliasRegistry};
use std::sync::Arc;

use crate::gateway_error::GatewayError;
use crate::pipeline::{
    priority, Middleware, Next, PipelineRequest, PipelineResponse, RequestKind,
    STATE_ALIAS_ORIGINAL_MODEL, STATE_ALIAS_PROVIDER,
};

pub struct AliasMiddleware {
    aliases: Arc<AliasRegistry>,
}

impl AliasMiddleware {
    pub fn new(aliases: Arc<AliasRegistry>) -> Self {
        Self { aliases }
    }
}

#[async_trait::async_trait]
impl Middleware for AliasMiddleware {
    fn name(&self) -> &'static str {
        "alias"
    }

    fn priority(&self) -> i32 {
        priority::ALIAS
    }

    async fn process(
        &self,
        request: &mut PipelineRequest,
        next: Next<'_>,
    ) -> Result<PipelineResponse, GatewayError> {
        let tenant = request.context.tenant_id.clone();
        let name = request.model().to_string();

        if let Some(targets) = self.aliases.resolve(tenant.as_deref(), &name) {
            if targets.is_empty() {
                return Err(GatewayError::NoTargetsAvailable { alias: name });
            }
            let target = pick_weighted(&targets).expect("target list is non-empty").clone();

            request.state.insert(
                STATE_ALIAS_ORIGINAL_MODEL.to_string(),
                serde_json::Value::String(name.clone()),
            );
            if !target.provider.is_empty() {
                request.state.insert(
                    STATE_ALIAS_PROVIDER.to_string(),
                    serde_json::Value::String(target.provider.clone()),
                );
            }

            match &mut request.kind {
                RequestKind::Complete(chat) | RequestKind::Stream(chat) => {
                    chat.model = target.model.clone();
                }
                RequestKind::Embed(embed) => {
                    embed.model = target.model.clone();
                }
            }
            tracing::debug!(
                alias = %name,
                model = %target.model,
                provider = %target.provider,
                "alias resolved"
            );
        }

        next.run(request).await
    }
}
