//! Transform middleware: input transforms on the way in, output transforms
//! on the way out with the original request kept for context.

use crate::gateway_error::GatewayError;
use crate::pipeline::{priority, Middleware, Next, PipelineRequest, PipelineResponse};
use crate::transforms::TransformRegistry;

pub struct TransformMiddleware {
    transforms: TransformRegistry,
}

impl TransformMiddleware {
    pub fn new(transforms: TransformRegistry) -> Self {
        Self { transforms }
    }
}

#[async_trait::async_trait]
impl Middleware for TransformMiddleware {
    fn name(&self) -> &'static str {
        "transform"
    }

    fn priority(&self) -> i32 {
        priority::TRANSFORM
    }

    async fn process(
        &self,
        request: &mut PipelineRequest,
        next: Next<'_>,
    ) -> Result<PipelineResponse, GatewayError> {
        if self.transforms.is_empty() {
            return next.run(request).await;
        }

        // The pre-transform request stays available for output transforms.
        let original = request.chat().cloned();

        if let Some(chat) = request.chat_mut() {
            self.transforms.apply_input(chat).await?;
        }

        let mut response = next.run(request).await?;

        if let (Some(original), Some(completion)) = (original.as_ref(), response.completion_mut())
        {
            self.transforms.apply_output(original, completion).await?;
        }

        Ok(response)
    }
}
