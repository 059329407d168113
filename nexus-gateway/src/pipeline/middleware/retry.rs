//! Retry middleware: bounded re-invocation with exponential backoff.
//!
//! Sleeps `delay * backoff^(k-1)` before attempt `k+1`. The backoff sleep
//! runs under the timeout middleware's deadline, so cancelling the request
//! cuts a sleeping retry short rather than letting it run out. After the
//! final attempt an upstream-class failure is wrapped as
//! `AllProvidersFailed`; everything else propagates as is.

use std::time::Duration;

use crate::gateway_error::GatewayError;
use crate::pipeline::{priority, Middleware, Next, PipelineRequest, PipelineResponse};

pub struct RetryMiddleware {
    max_retries: u32,
    delay: Duration,
    backoff: f64,
}

impl RetryMiddleware {
    pub fn new(max_retries: u32, delay: Duration, backoff: f64) -> Self {
        Self {
            max_retries,
            delay,
            backoff: if backoff > 0.0 { backoff } else { 1.0 },
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        self.delay.mul_f64(self.backoff.powi(attempt as i32 - 1))
    }
}

#[async_trait::async_trait]
impl Middleware for RetryMiddleware {
    fn name(&self) -> &'static str {
        "retry"
    }

    fn priority(&self) -> i32 {
        priority::RETRY
    }

    async fn process(
        &self,
        request: &mut PipelineRequest,
        next: Next<'_>,
    ) -> Result<PipelineResponse, GatewayError> {
        let attempts = self.max_retries + 1;
        let mut last_error = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::time::sleep(self.backoff_delay(attempt - 1)).await;
            }
            match next.run(request).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "attempt failed");
                    last_error = Some(err);
                }
            }
        }

        let last = last_error.expect("at least one attempt ran");
        if last.is_upstream() {
            Err(GatewayError::AllProvidersFailed {
                attempts,
                last: last.to_string(),
            })
        } else {
            Err(last)
        }
    }
}
