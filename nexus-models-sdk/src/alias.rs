//! # Model Alias Registry
//!
//! Maps virtual model names to weighted lists of concrete
//! `(provider, model)` targets, optionally scoped to a tenant. Lookup order
//! is `(tenant, name)` then the global `("", name)` entry; a tenant entry
//! shadows the global one entirely, the lists are never merged. A miss is
//! not an error, the request proceeds with the literal model name.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// One concrete target behind an alias.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AliasTarget {
    /// Provider name honored as a routing constraint when set.
    pub provider: String,
    /// Concrete model name to rewrite the request to.
    pub model: String,
    /// Relative selection weight; non-positive values count as 1.0.
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

type AliasKey = (String, String);

/// Tenant-scoped alias registry. The empty tenant id is the global default.
#[derive(Default)]
pub struct AliasRegistry {
    entries: RwLock<HashMap<AliasKey, Vec<AliasTarget>>>,
}

impl AliasRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the target list for `(tenant, name)`. Pass `None`
    /// for the global entry.
    pub fn register(&self, tenant_id: Option<&str>, name: &str, targets: Vec<AliasTarget>) {
        let key = (tenant_id.unwrap_or("").to_string(), name.to_string());
        self.entries.write().unwrap().insert(key, targets);
    }

    /// Remove the entry for `(tenant, name)`.
    pub fn remove(&self, tenant_id: Option<&str>, name: &str) {
        let key = (tenant_id.unwrap_or("").to_string(), name.to_string());
        self.entries.write().unwrap().remove(&key);
    }

    /// Resolve an alias: the tenant entry wins, the global entry is
    /// fallback, and a miss returns `None`.
    pub fn resolve(&self, tenant_id: Option<&str>, name: &str) -> Option<Vec<AliasTarget>> {
        let entries = self.entries.read().unwrap();
        if let Some(tenant) = tenant_id {
            if !tenant.is_empty() {
                if let Some(targets) = entries.get(&(tenant.to_string(), name.to_string())) {
                    return Some(targets.clone());
                }
            }
        }
        entries.get(&(String::new(), name.to_string())).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Pick one target by weighted random draw.
pub fn pick_weighted(targets: &[AliasTarget]) -> Option<&AliasTarget> {
    pick_weighted_at(targets, rand::thread_rng().gen())
}

/// Deterministic weighted pick driven by a draw `r` in `[0, 1)`: accumulate
/// positive weights, scale the draw to the total, and walk the list
/// subtracting.
pub fn pick_weighted_at(targets: &[AliasTarget], r: f64) -> Option<&AliasTarget> {
    if targets.is_empty() {
        return None;
    }
    let weight_of = |t: &AliasTarget| if t.weight > 0.0 { t.weight } else { 1.0 };
    let total: f64 = targets.iter().map(weight_of).sum();
    let mut remaining = r * total;
    for target in targets {
        remaining -= weight_of(target);
        if remaining < 0.0 {
            return Some(target);
        }
    }
    targets.last()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(provider: &str, model: &str, weight: f64) -> AliasTarget {
        AliasTarget {
            provider: provider.to_string(),
            model: model.to_string(),
            weight,
        }
    }

    #[test]
    fn test_tenant_entry_shadows_global() {
        let registry = AliasRegistry::new();
        registry.register(None, "fast", vec![target("openai", "gpt-4o-mini", 1.0)]);
        registry.register(
            Some("acme"),
            "fast",
            vec![target("anthropic", "claude-3-haiku", 1.0)],
        );

        let global = registry.resolve(None, "fast").unwrap();
        assert_eq!(global[0].provider, "openai");

        let scoped = registry.resolve(Some("acme"), "fast").unwrap();
        assert_eq!(scoped[0].provider, "anthropic");

        // A tenant without its own entry falls back to the global one.
        let other = registry.resolve(Some("globex"), "fast").unwrap();
        assert_eq!(other[0].provider, "openai");
    }

    #[test]
    fn test_miss_is_none() {
        let registry = AliasRegistry::new();
        assert!(registry.resolve(None, "unknown").is_none());
    }

    #[test]
    fn test_weighted_pick_walks_accumulated_weights() {
        let targets = vec![
            target("a", "m1", 1.0),
            target("b", "m2", 3.0),
        ];
        // Total 4.0: draws under 0.25 land on the first target.
        assert_eq!(pick_weighted_at(&targets, 0.1).unwrap().provider, "a");
        assert_eq!(pick_weighted_at(&targets, 0.3).unwrap().provider, "b");
        assert_eq!(pick_weighted_at(&targets, 0.99).unwrap().provider, "b");
    }

    #[test]
    fn test_non_positive_weights_count_as_one() {
        let targets = vec![target("a", "m1", 0.0), target("b", "m2", -2.0)];
        // Both normalize to 1.0, so the midpoint draw lands on the second.
        assert_eq!(pick_weighted_at(&targets, 0.5).unwrap().provider, "b");
        assert_eq!(pick_weighted_at(&targets, 0.49).unwrap().provider, "a");
    }

    #[test]
    fn test_weighted_selection_converges() {
        let targets = vec![target("a", "m1", 1.0), target("b", "m2", 3.0)];
        let mut hits = 0u32;
        let n = 20_000u32;
        for i in 0..n {
            let r = (i as f64 + 0.5) / n as f64;
            if pick_weighted_at(&targets, r).unwrap().provider == "b" {
                hits += 1;
            }
        }
        let share = hits as f64 / n as f64;
        assert!((share - 0.75).abs() < 0.01, "share was {share}");
    }
}
