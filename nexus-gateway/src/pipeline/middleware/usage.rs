//! Usage-tracking middleware: records every request, success or failure.
//!
//! The outermost observer. Completions are recorded immediately; failures
//! are recorded with status 500; streams are recorded when they finish, via
//! a wrapper that fires once the terminal chunk has been seen (or the
//! stream is closed early), so the deferred token counts make it into the
//! record. Writes are fire-and-forget: a failing store is logged, never
//! propagated into the response path.

use async_trait::async_trait;
use nexus_models_sdk::error::ProviderError;
use nexus_models_sdk::models::{StreamChunk, Usage};
use nexus_models_sdk::streaming::{BoxCompletionStream, CompletionStream};

use crate::gateway_error::GatewayError;
use crate::pipeline::{priority, Middleware, Next, PipelineRequest, PipelineResponse};
use crate::pricing::PricingTable;
use crate::services::{UsageRecord, UsageService};

pub struct UsageTrackingMiddleware {
    usage: UsageService,
    pricing: PricingTable,
}

impl UsageTrackingMiddleware {
    pub fn new(usage: UsageService, pricing: PricingTable) -> Self {
        Self { usage, pricing }
    }

    fn base_record(&self, request: &PipelineRequest) -> UsageRecord {
        let context = &request.context;
        UsageRecord {
            key_id: context.key_id.clone(),
            provider: context.provider.clone().unwrap_or_default(),
            model: request.model().to_string(),
            latency_ms: context.elapsed_ms(),
            cached: context.cache_hit,
            ..UsageRecord::new(
                context.tenant_id.clone().unwrap_or_default(),
                context.request_id.clone(),
            )
        }
    }

    fn submit(&self, record: UsageRecord) {
        let usage = self.usage.clone();
        tokio::spawn(async move {
            if let Err(err) = usage.record(record).await {
                tracing::warn!(error = %err, "failed to write usage record");
            }
        });
    }
}

#[async_trait]
impl Middleware for UsageTrackingMiddleware {
    fn name(&self) -> &'static str {
        "usage_tracking"
    }

    fn priority(&self) -> i32 {
        priority::USAGE
    }

    async fn process(
        &self,
        request: &mut PipelineRequest,
        next: Next<'_>,
    ) -> Result<PipelineResponse, GatewayError> {
        let result = next.run(request).await;

        match result {
            Ok(PipelineResponse::Completion(response)) => {
                let mut record = self.base_record(request);
                record.provider = response.provider.clone();
                record.model = response.model.clone();
                if let Some(usage) = &response.usage {
                    record.prompt_tokens = usage.prompt_tokens;
                    record.completion_tokens = usage.completion_tokens;
                    record.total_tokens = usage.total_tokens;
                }
                record.cost_usd = if response.cost_usd > 0.0 {
                    response.cost_usd
                } else {
                    response
                        .usage
                        .map(|u| self.pricing.cost(&response.model, &u))
                        .unwrap_or(0.0)
                };
                self.submit(record);
                Ok(PipelineResponse::Completion(response))
            }
            Ok(PipelineResponse::Stream(stream)) => {
                let record = self.base_record(request);
                Ok(PipelineResponse::Stream(Box::new(UsageRecordingStream {
                    inner: stream,
                    usage: self.usage.clone(),
                    pricing: self.pricing.clone(),
                    record: Some(record),
                })))
            }
            Ok(other) => {
                let mut record = self.base_record(request);
                record.cached = false;
                self.submit(record);
                Ok(other)
            }
            Err(err) => {
                // Failures are recorded as server errors.
                let mut record = self.base_record(request);
                record.status_code = 500;
                self.submit(record);
                Err(err)
            }
        }
    }
}

/// Defers the usage record of a streaming request until the stream ends.
struct UsageRecordingStream {
    inner: BoxCompletionStream,
    usage: UsageService,
    pricing: PricingTable,
    record: Option<UsageRecord>,
}

impl UsageRecordingStream {
    fn fire(&mut self, status_code: u16) {
        let Some(mut record) = self.record.take() else {
            return;
        };
        if let Some(usage) = self.inner.usage() {
            record.prompt_tokens = usage.prompt_tokens;
            record.completion_tokens = usage.completion_tokens;
            record.total_tokens = usage.total_tokens;
            record.cost_usd = self.pricing.cost(&record.model, &usage);
        }
        record.status_code = status_code;
        let service = self.usage.clone();
        // Drop can run outside a runtime; skip the write rather than panic.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(err) = service.record(record).await {
                    tracing::warn!(error = %err, "failed to write usage record for stream");
                }
            });
        }
    }
}

#[async_trait]
impl CompletionStream for UsageRecordingStream {
    async fn next(&mut self) -> Option<Result<StreamChunk, ProviderError>> {
        match self.inner.next().await {
            Some(Ok(chunk)) => Some(Ok(chunk)),
            Some(Err(err)) => {
                self.fire(500);
                Some(Err(err))
            }
            None => {
                self.fire(200);
                None
            }
        }
    }

    fn usage(&self) -> Option<Usage> {
        self.inner.usage()
    }

    async fn close(&mut self) {
        self.inner.close().await;
        self.fire(200);
    }
}

impl Drop for UsageRecordingStream {
    fn drop(&mut self) {
        // A consumer that walks away mid-stream still leaves a record.
        self.fire(200);
    }
}
