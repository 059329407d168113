//! # Router
//!
//! Selects one provider from a candidate set using a pluggable strategy.
//! Candidates are annotated with weight, registration priority, passive
//! health, recent latency, and per-token cost; every strategy first drops
//! unhealthy candidates and then applies its own selection rule.
//!
//! Built-in strategies:
//!
//! - **priority** (default): first healthy candidate in registration order
//! - **round_robin**: atomic cursor modulo healthy count, fair over
//!   unbounded calls
//! - **weighted**: proportional to candidate weight
//! - **cost_optimized**: proportional to inverse per-token cost
//! - **latency**: lowest recent mean latency
//!
//! Selection is pure except for the round-robin cursor. Routing never
//! performs the upstream call itself.

use crate::health::HealthTracker;
use crate::providers::Provider;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// A provider under consideration during routing.
#[derive(Clone)]
pub struct Candidate {
    pub provider: Arc<dyn Provider>,
    /// Relative selection weight; non-positive values count as 1.0.
    pub weight: f64,
    /// Registration position, lower first.
    pub priority: u32,
    /// Passive health verdict at candidate-build time.
    pub healthy: bool,
    /// Recent mean latency in milliseconds; 0.0 when untracked.
    pub latency_ms: f64,
    /// Blended per-token cost in USD; 0.0 when unknown.
    pub cost_per_token: f64,
}

impl std::fmt::Debug for Candidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Candidate")
            .field("provider", &self.provider.name())
            .field("weight", &self.weight)
            .field("priority", &self.priority)
            .field("healthy", &self.healthy)
            .field("latency_ms", &self.latency_ms)
            .field("cost_per_token", &self.cost_per_token)
            .finish()
    }
}

/// Routing failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("no providers registered for request")]
    NoCandidates,
    #[error("no healthy providers available")]
    NoHealthyProviders,
}

/// A provider-selection strategy.
pub trait Strategy: Send + Sync {
    /// Stable name for diagnostics and configuration.
    fn name(&self) -> &'static str;

    /// Pick one candidate. Unhealthy candidates are filtered out before the
    /// strategy-specific rule applies.
    fn select(&self, candidates: &[Candidate]) -> Result<Candidate, RoutingError>;
}

fn healthy_subset(candidates: &[Candidate]) -> Result<Vec<&Candidate>, RoutingError> {
    if candidates.is_empty() {
        return Err(RoutingError::NoCandidates);
    }
    let healthy: Vec<&Candidate> = candidates.iter().filter(|c| c.healthy).collect();
    if healthy.is_empty() {
        return Err(RoutingError::NoHealthyProviders);
    }
    Ok(healthy)
}

fn effective_weight(raw: f64) -> f64 {
    if raw > 0.0 {
        raw
    } else {
        1.0
    }
}

/// Proportional pick over `healthy` with weights from `weight_of`, driven by
/// a draw `r` in `[0, 1)`.
fn pick_proportional<'a>(
    healthy: &[&'a Candidate],
    weight_of: impl Fn(&Candidate) -> f64,
    r: f64,
) -> &'a Candidate {
    let total: f64 = healthy.iter().map(|c| effective_weight(weight_of(c))).sum();
    let mut remaining = r * total;
    for candidate in healthy {
        remaining -= effective_weight(weight_of(candidate));
        if remaining < 0.0 {
            return candidate;
        }
    }
    healthy[healthy.len() - 1]
}

/// First healthy candidate in registration order. The default.
#[derive(Default)]
pub struct PriorityStrategy;

impl Strategy for PriorityStrategy {
    fn name(&self) -> &'static str {
        "priority"
    }

    fn select(&self, candidates: &[Candidate]) -> Result<Candidate, RoutingError> {
        let healthy = healthy_subset(candidates)?;
        Ok(healthy
            .iter()
            .min_by_key(|c| c.priority)
            .map(|c| (*c).clone())
            .expect("healthy subset is non-empty"))
    }
}

/// Atomic cursor modulo healthy count.
#[derive(Default)]
pub struct RoundRobinStrategy {
    counter: AtomicUsize,
}

impl Strategy for RoundRobinStrategy {
    fn name(&self) -> &'static str {
        "round_robin"
    }

    fn select(&self, candidates: &[Candidate]) -> Result<Candidate, RoutingError> {
        let healthy = healthy_subset(candidates)?;
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % healthy.len();
        Ok(healthy[index].clone())
    }
}

/// Proportional to candidate weight.
#[derive(Default)]
pub struct WeightedStrategy;

impl Strategy for WeightedStrategy {
    fn name(&self) -> &'static str {
        "weighted"
    }

    fn select(&self, candidates: &[Candidate]) -> Result<Candidate, RoutingError> {
        let healthy = healthy_subset(candidates)?;
        let r: f64 = rand::thread_rng().gen();
        Ok(pick_proportional(&healthy, |c| c.weight, r).clone())
    }
}

/// Proportional to inverse per-token cost, so cheaper candidates win more
/// often. Unknown costs count as weight 1.0.
#[derive(Default)]
pub struct CostOptimizedStrategy;

impl Strategy for CostOptimizedStrategy {
    fn name(&self) -> &'static str {
        "cost_optimized"
    }

    fn select(&self, candidates: &[Candidate]) -> Result<Candidate, RoutingError> {
        let healthy = healthy_subset(candidates)?;
        let r: f64 = rand::thread_rng().gen();
        Ok(pick_proportional(
            &healthy,
            |c| {
                if c.cost_per_token > 0.0 {
                    1.0 / c.cost_per_token
                } else {
                    1.0
                }
            },
            r,
        )
        .clone())
    }
}

/// Lowest recent mean latency wins; untracked candidates report 0.0 and are
/// tried first.
#[derive(Default)]
pub struct LatencyStrategy;

impl Strategy for LatencyStrategy {
    fn name(&self) -> &'static str {
        "latency"
    }

    fn select(&self, candidates: &[Candidate]) -> Result<Candidate, RoutingError> {
        let healthy = healthy_subset(candidates)?;
        Ok(healthy
            .iter()
            .min_by(|a, b| {
                a.latency_ms
                    .partial_cmp(&b.latency_ms)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|c| (*c).clone())
            .expect("healthy subset is non-empty"))
    }
}

/// Resolve a configured strategy name. Accepts both snake and kebab case.
pub fn strategy_from_name(name: &str) -> Option<Box<dyn Strategy>> {
    match name {
        "priority" => Some(Box::<PriorityStrategy>::default()),
        "round_robin" | "round-robin" => Some(Box::<RoundRobinStrategy>::default()),
        "weighted" => Some(Box::<WeightedStrategy>::default()),
        "cost_optimized" | "cost-optimized" => Some(Box::<CostOptimizedStrategy>::default()),
        "latency" | "latency-based" => Some(Box::<LatencyStrategy>::default()),
        _ => None,
    }
}

/// Builds candidates from the passive health tracker and delegates the pick
/// to the configured strategy.
pub struct Router {
    strategy: Box<dyn Strategy>,
    health: Arc<HealthTracker>,
}

impl Router {
    pub fn new(strategy: Box<dyn Strategy>, health: Arc<HealthTracker>) -> Self {
        Self { strategy, health }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn health(&self) -> &Arc<HealthTracker> {
        &self.health
    }

    /// Annotate providers with health, latency, and cost in registration
    /// order.
    pub fn build_candidates(
        &self,
        providers: &[Arc<dyn Provider>],
        costs: &HashMap<String, f64>,
    ) -> Vec<Candidate> {
        providers
            .iter()
            .enumerate()
            .map(|(index, provider)| {
                let snapshot = self.health.stats(provider.name());
                Candidate {
                    provider: Arc::clone(provider),
                    weight: 1.0,
                    priority: index as u32,
                    healthy: self.health.is_healthy(provider.name()),
                    latency_ms: snapshot.mean_latency_ms,
                    cost_per_token: costs.get(provider.name()).copied().unwrap_or(0.0),
                }
            })
            .collect()
    }

    /// Select one provider for this request.
    pub fn route(
        &self,
        providers: &[Arc<dyn Provider>],
        costs: &HashMap<String, f64>,
    ) -> Result<Arc<dyn Provider>, RoutingError> {
        let candidates = self.build_candidates(providers, costs);
        self.strategy.select(&candidates).map(|c| c.provider)
    }

    /// Select with an explicit strategy override, leaving the configured
    /// default untouched. Used for per-tenant routing overrides.
    pub fn route_with(
        &self,
        strategy: &dyn Strategy,
        providers: &[Arc<dyn Provider>],
        costs: &HashMap<String, f64>,
    ) -> Result<Arc<dyn Provider>, RoutingError> {
        let candidates = self.build_candidates(providers, costs);
        strategy.select(&candidates).map(|c| c.provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::models::*;
    use crate::providers::Capabilities;
    use crate::streaming::BoxCompletionStream;
    use std::time::Duration;

    struct NamedProvider(String);

    #[async_trait::async_trait]
    impl Provider for NamedProvider {
        fn name(&self) -> &str {
            &self.0
        }
        fn capabilities(&self) -> Capabilities {
            Capabilities::chat_only()
        }
        async fn models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
            Ok(vec![])
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

    fn candidate(name: &str, priority: u32, healthy: bool) -> Candidate {
        Candidate {
            provider: Arc::new(NamedProvider(name.to_string())),
            weight: 1.0,
            priority,
            healthy,
            latency_ms: 0.0,
            cost_per_token: 0.0,
        }
    }

    #[test]
    fn test_priority_skips_unhealthy() {
        let strategy = PriorityStrategy;
        let candidates = vec![
            candidate("a", 0, false),
            candidate("b", 1, true),
            candidate("c", 2, true),
        ];
        let picked = strategy.select(&candidates).unwrap();
        assert_eq!(picked.provider.name(), "b");
    }

    #[test]
    fn test_no_healthy_is_an_error() {
        let strategy = PriorityStrategy;
        let candidates = vec![candidate("a", 0, false)];
        assert_eq!(
            strategy.select(&candidates).unwrap_err(),
            RoutingError::NoHealthyProviders
        );
        assert_eq!(strategy.select(&[]).unwrap_err(), RoutingError::NoCandidates);
    }

    #[test]
    fn test_round_robin_is_fair() {
        let strategy = RoundRobinStrategy::default();
        let candidates = vec![candidate("a", 0, true), candidate("b", 1, true)];
        let mut counts = std::collections::HashMap::new();
        for _ in 0..10 {
            let picked = strategy.select(&candidates).unwrap();
            *counts.entry(picked.provider.name().to_string()).or_insert(0) += 1;
        }
        assert_eq!(counts["a"], 5);
        assert_eq!(counts["b"], 5);
    }

    #[test]
    fn test_proportional_pick_respects_weights() {
        let candidates = vec![candidate("a", 0, true), candidate("b", 1, true)];
        let mut heavy = candidates.clone();
        heavy[0].weight = 3.0;
        let healthy: Vec<&Candidate> = heavy.iter().collect();

        // 3:1 split puts draws below 0.75 on the first candidate.
        assert_eq!(pick_proportional(&healthy, |c| c.weight, 0.5).provider.name(), "a");
        assert_eq!(pick_proportional(&healthy, |c| c.weight, 0.9).provider.name(), "b");
    }

    #[test]
    fn test_latency_prefers_fastest() {
        let strategy = LatencyStrategy;
        let mut candidates = vec![candidate("slow", 0, true), candidate("fast", 1, true)];
        candidates[0].latency_ms = 900.0;
        candidates[1].latency_ms = 120.0;
        assert_eq!(strategy.select(&candidates).unwrap().provider.name(), "fast");
    }

    #[test]
    fn test_strategy_from_name() {
        assert_eq!(strategy_from_name("priority").unwrap().name(), "priority");
        assert_eq!(strategy_from_name("round-robin").unwrap().name(), "round_robin");
        assert_eq!(strategy_from_name("latency-based").unwrap().name(), "latency");
        assert!(strategy_from_name("coin-flip").is_none());
    }

    #[test]
    fn test_router_uses_tracker_health() {
        let health = Arc::new(HealthTracker::default());
        // Two successes, eight failures: well under the health threshold.
        health.record_success("a", Duration::from_millis(5));
        health.record_success("a", Duration::from_millis(5));
        for _ in 0..8 {
            health.record_failure("a", "boom");
        }

        let router = Router::new(Box::<PriorityStrategy>::default(), health);
        let providers: Vec<Arc<dyn Provider>> = vec![
            Arc::new(NamedProvider("a".to_string())),
            Arc::new(NamedProvider("b".to_string())),
        ];
        let picked = router.route(&providers, &HashMap::new()).unwrap();
        assert_eq!(picked.name(), "b");
    }
}
