//! # Health Tracker
//!
//! Passive per-provider rolling statistics fed by the provider-call step and
//! consumed by routing. Tracks success and failure counts, a bounded ring of
//! recent success latencies, and the last observed error.
//!
//! A provider with no recorded traffic is treated as healthy: with no
//! evidence against it, routing should be willing to try it.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::Duration;

/// Default cap on retained latency samples per provider.
pub const DEFAULT_MAX_SAMPLES: usize = 1000;

#[derive(Debug, Default)]
struct RollingStats {
    successes: u64,
    failures: u64,
    latencies_ms: VecDeque<u64>,
    last_success: Option<DateTime<Utc>>,
    last_failure: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

/// Computed snapshot of a provider's rolling window.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthSnapshot {
    pub successes: u64,
    pub failures: u64,
    pub success_rate: f64,
    pub mean_latency_ms: f64,
    pub p99_latency_ms: u64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl HealthSnapshot {
    pub fn total(&self) -> u64 {
        self.successes + self.failures
    }
}

/// Concurrent map of provider name to rolling health window.
pub struct HealthTracker {
    stats: DashMap<String, RollingStats>,
    max_samples: usize,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SAMPLES)
    }
}

impl HealthTracker {
    pub fn new(max_samples: usize) -> Self {
        Self {
            stats: DashMap::new(),
            max_samples: max_samples.max(1),
        }
    }

    /// Record a successful upstream call and its latency.
    pub fn record_success(&self, provider: &str, latency: Duration) {
        let mut entry = self.stats.entry(provider.to_string()).or_default();
        entry.successes += 1;
        entry.last_success = Some(Utc::now());
        entry.latencies_ms.push_back(latency.as_millis() as u64);
        while entry.latencies_ms.len() > self.max_samples {
            entry.latencies_ms.pop_front();
        }
    }

    /// Record a failed upstream call.
    pub fn record_failure(&self, provider: &str, error: impl Into<String>) {
        let error = error.into();
        tracing::debug!(provider, error = %error, "provider failure recorded");
        let mut entry = self.stats.entry(provider.to_string()).or_default();
        entry.failures += 1;
        entry.last_failure = Some(Utc::now());
        entry.last_error = Some(error);
    }

    /// Compute the current snapshot for a provider. A provider never seen
    /// reports a perfect success rate and zero latency.
    pub fn stats(&self, provider: &str) -> HealthSnapshot {
        match self.stats.get(provider) {
            Some(entry) => {
                let total = entry.successes + entry.failures;
                let success_rate = if total == 0 {
                    1.0
                } else {
                    entry.successes as f64 / total as f64
                };
                let mean_latency_ms = if entry.latencies_ms.is_empty() {
                    0.0
                } else {
                    entry.latencies_ms.iter().sum::<u64>() as f64
                        / entry.latencies_ms.len() as f64
                };
                let p99_latency_ms = percentile_99(&entry.latencies_ms);
                HealthSnapshot {
                    successes: entry.successes,
                    failures: entry.failures,
                    success_rate,
                    mean_latency_ms,
                    p99_latency_ms,
                    last_success: entry.last_success,
                    last_failure: entry.last_failure,
                    last_error: entry.last_error.clone(),
                }
            }
            None => HealthSnapshot {
                successes: 0,
                failures: 0,
                success_rate: 1.0,
                mean_latency_ms: 0.0,
                p99_latency_ms: 0,
                last_success: None,
                last_failure: None,
                last_error: None,
            },
        }
    }

    /// Healthiness predicate used by routing: no evidence, or a success rate
    /// strictly above one half. Exactly 50% is unhealthy.
    pub fn is_healthy(&self, provider: &str) -> bool {
        let snapshot = self.stats(provider);
        snapshot.total() == 0 || snapshot.success_rate > 0.5
    }
}

fn percentile_99(latencies: &VecDeque<u64>) -> u64 {
    if latencies.is_empty() {
        return 0;
    }
    let mut sorted: Vec<u64> = latencies.iter().copied().collect();
    sorted.sort_unstable();
    let index = ((sorted.len() as f64) * 0.99).floor() as usize;
    sorted[index.min(sorted.len() - 1)]
}
