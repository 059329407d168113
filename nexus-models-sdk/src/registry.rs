//! # Provider Registry
//!
//! Thread-safe, insertion-ordered mapping of name to provider. Iteration
//! order is the order providers were first registered; re-registering a name
//! replaces the instance but keeps its original position, so routing
//! priority stays stable across hot swaps.

use crate::providers::Provider;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Default)]
struct RegistryInner {
    providers: HashMap<String, Arc<dyn Provider>>,
    order: Vec<String>,
}

/// Insertion-ordered provider registry.
#[derive(Default)]
pub struct ProviderRegistry {
    inner: RwLock<RegistryInner>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite by name, preserving the first-seen position.
    pub fn register(&self, provider: Arc<dyn Provider>) {
        let name = provider.name().to_string();
        let mut inner = self.inner.write().unwrap();
        if inner.providers.insert(name.clone(), provider).is_none() {
            tracing::debug!(provider = %name, "provider registered");
            inner.order.push(name);
        } else {
            tracing::debug!(provider = %name, "provider replaced in place");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.inner.read().unwrap().providers.get(name).cloned()
    }

    /// All providers in insertion order.
    pub fn all(&self) -> Vec<Arc<dyn Provider>> {
        let inner = self.inner.read().unwrap();
        inner
            .order
            .iter()
            .filter_map(|name| inner.providers.get(name).cloned())
            .collect()
    }

    /// Registered names in insertion order.
    pub fn names(&self) -> Vec<String> {
        self.inner.read().unwrap().order.clone()
    }

    /// Providers whose capability record supports `capability`, in order.
    pub fn with_capability(&self, capability: &str) -> Vec<Arc<dyn Provider>> {
        self.all()
            .into_iter()
            .filter(|p| p.capabilities().supports(capability))
            .collect()
    }

    /// Providers whose active probe reports them up, in order.
    pub async fn healthy(&self) -> Vec<Arc<dyn Provider>> {
        let mut survivors = Vec::new();
        for provider in self.all() {
            if provider.healthy().await {
                survivors.push(provider);
            }
        }
        survivors
    }

    /// Providers whose catalog lists `model`, in order. A provider whose
    /// catalog cannot be read is kept, on the assumption that an unreachable
    /// catalog says nothing about the model.
    pub async fn for_model(&self, model: &str) -> Vec<Arc<dyn Provider>> {
        let mut matches = Vec::new();
        for provider in self.all() {
            match provider.models().await {
                Ok(models) => {
                    if models.iter().any(|m| m.id == model) {
                        matches.push(provider);
                    }
                }
                Err(_) => matches.push(provider),
            }
        }
        matches
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::models::*;
    use crate::providers::Capabilities;
    use crate::streaming::BoxCompletionStream;

    struct StubProvider {
        name: String,
        capabilities: Capabilities,
        models: Vec<String>,
    }

    impl StubProvider {
        fn new(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                capabilities: Capabilities::chat_only(),
                models: vec![format!("{name}-model")],
            })
        }
    }

    #[async_trait::async_trait]
    impl Provider for StubProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn capabilities(&self) -> Capabilities {
            self.capabilities
        }

        async fn models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
            Ok(self
                .models
                .iter()
                .map(|id| ModelInfo {
                    id: id.clone(),
                    provider: self.name.clone(),
                    context_window: None,
                    input_cost_per_1k: None,
                    output_cost_per_1k: None,
                })
                .collect())
        }

        async fn complete(&self, _request: ChatRequest) -> Result<ChatResponse, ProviderError> {
            Err(ProviderError::NotSupported { feature: "complete".into() })
        }

        async fn complete_stream(
            &self,
            _request: ChatRequest,
        ) -> Result<BoxCompletionStream, ProviderError> {
            Err(ProviderError::NotSupported { feature: "streaming".into() })
        }

        async fn healthy(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_insertion_order_preserved() {
        let registry = ProviderRegistry::new();
        registry.register(StubProvider::new("alpha"));
        registry.register(StubProvider::new("beta"));
        registry.register(StubProvider::new("gamma"));
        assert_eq!(registry.names(), vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn test_overwrite_keeps_position() {
        let registry = ProviderRegistry::new();
        registry.register(StubProvider::new("alpha"));
        registry.register(StubProvider::new("beta"));
        registry.register(StubProvider::new("alpha"));
        assert_eq!(registry.names(), vec!["alpha", "beta"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_capability_filter() {
        let registry = ProviderRegistry::new();
        registry.register(StubProvider::new("alpha"));
        let embedder = Arc::new(StubProvider {
            name: "embedder".to_string(),
            capabilities: Capabilities {
                embeddings: true,
                ..Default::default()
            },
            models: vec![],
        });
        registry.register(embedder);

        let chat = registry.with_capability("chat");
        assert_eq!(chat.len(), 1);
        assert_eq!(chat[0].name(), "alpha");

        let embeddings = registry.with_capability("embeddings");
        assert_eq!(embeddings.len(), 1);
        assert_eq!(embeddings[0].name(), "embedder");
    }

    #[tokio::test]
    async fn test_for_model_filters_by_catalog() {
        let registry = ProviderRegistry::new();
        registry.register(StubProvider::new("alpha"));
        registry.register(StubProvider::new("beta"));

        let matches = registry.for_model("beta-model").await;
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].name(), "beta");
    }
}
