//! Per-model pricing used for cost accounting and budget estimates.

use nexus_models_sdk::models::Usage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// USD prices per 1000 tokens for one model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct ModelPricing {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

impl ModelPricing {
    pub fn new(input_per_1k: f64, output_per_1k: f64) -> Self {
        Self {
            input_per_1k,
            output_per_1k,
        }
    }
}

/// Model name to pricing map with cost helpers.
#[derive(Debug, Clone, Default)]
pub struct PricingTable {
    prices: HashMap<String, ModelPricing>,
}

impl PricingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, model: impl Into<String>, pricing: ModelPricing) -> Self {
        self.prices.insert(model.into(), pricing);
        self
    }

    pub fn insert(&mut self, model: impl Into<String>, pricing: ModelPricing) {
        self.prices.insert(model.into(), pricing);
    }

    pub fn get(&self, model: &str) -> Option<ModelPricing> {
        self.prices.get(model).copied()
    }

    /// Exact cost for a measured usage. Zero for unpriced models.
    pub fn cost(&self, model: &str, usage: &Usage) -> f64 {
        match self.get(model) {
            Some(pricing) => {
                (usage.prompt_tokens as f64 / 1000.0) * pricing.input_per_1k
                    + (usage.completion_tokens as f64 / 1000.0) * pricing.output_per_1k
            }
            None => 0.0,
        }
    }

    /// Pre-flight cost estimate for a token count, priced at the input
    /// rate. Zero for unpriced models.
    pub fn estimate(&self, model: &str, estimated_tokens: u32) -> f64 {
        match self.get(model) {
            Some(pricing) => (estimated_tokens as f64 / 1000.0) * pricing.input_per_1k,
            None => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_splits_input_and_output() {
        let table = PricingTable::new().with("gpt-4o", ModelPricing::new(5.0, 15.0));
        let usage = Usage::new(1000, 2000);
        assert!((table.cost("gpt-4o", &usage) - 35.0).abs() < 1e-9);
        assert_eq!(table.cost("unknown", &usage), 0.0);
    }

    #[test]
    fn test_estimate_uses_input_rate() {
        let table = PricingTable::new().with("gpt-4o", ModelPricing::new(5.0, 15.0));
        assert!((table.estimate("gpt-4o", 2000) - 10.0).abs() < 1e-9);
    }
}
