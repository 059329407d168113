//! Append-only usage accounting: per-request records, spend and request
//! aggregation, and period summaries grouped by provider and model.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::gateway_error::GatewayError;

/// One append-only datum about a completed (or failed) request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: String,
    pub tenant_id: String,
    pub key_id: Option<String>,
    pub request_id: String,
    pub provider: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub cost_usd: f64,
    pub latency_ms: u64,
    pub cached: bool,
    pub status_code: u16,
    pub created_at: DateTime<Utc>,
}

impl UsageRecord {
    pub fn new(tenant_id: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.into(),
            key_id: None,
            request_id: request_id.into(),
            provider: String::new(),
            model: String::new(),
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            cost_usd: 0.0,
            latency_ms: 0,
            cached: false,
            status_code: 200,
            created_at: Utc::now(),
        }
    }
}

/// Aggregation window for [`UsageService::summary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryPeriod {
    Day,
    Week,
    Month,
}

/// One aggregation bucket.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageBucket {
    pub requests: u64,
    pub tokens: u64,
    pub cost_usd: f64,
}

/// Aggregated usage for one tenant over one period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageSummary {
    pub period: SummaryPeriod,
    pub total_requests: u64,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub by_provider: HashMap<String, UsageBucket>,
    pub by_model: HashMap<String, UsageBucket>,
}

/// Persistence seam for usage records.
#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn append(&self, record: UsageRecord) -> Result<(), GatewayError>;
    async fn for_tenant_since(
        &self,
        tenant_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<UsageRecord>, GatewayError>;
}

/// Concurrent in-memory usage store.
#[derive(Default)]
pub struct InMemoryUsageStore {
    records: RwLock<Vec<UsageRecord>>,
}

impl InMemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageStore for InMemoryUsageStore {
    async fn append(&self, record: UsageRecord) -> Result<(), GatewayError> {
        self.records.write().unwrap().push(record);
        Ok(())
    }

    async fn for_tenant_since(
        &self,
        tenant_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<UsageRecord>, GatewayError> {
        Ok(self
            .records
            .read()
            .unwrap()
            .iter()
            .filter(|r| r.tenant_id == tenant_id && r.created_at >= since)
            .cloned()
            .collect())
    }
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is valid")
        .and_utc()
}

fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .with_day(1)
        .expect("day one is valid")
        .and_hms_opt(0, 0, 0)
        .expect("midnight is valid")
        .and_utc()
}

/// Usage recording and aggregation over an injected store.
#[derive(Clone)]
pub struct UsageService {
    store: Arc<dyn UsageStore>,
}

impl UsageService {
    pub fn new(store: Arc<dyn UsageStore>) -> Self {
        Self { store }
    }

    pub async fn record(&self, record: UsageRecord) -> Result<(), GatewayError> {
        self.store.append(record).await
    }

    /// USD spent since the first of the current month.
    pub async fn monthly_spend(&self, tenant_id: &str) -> Result<f64, GatewayError> {
        let since = start_of_month(Utc::now());
        let records = self.store.for_tenant_since(tenant_id, since).await?;
        Ok(records.iter().map(|r| r.cost_usd).sum())
    }

    /// Requests since the start of the current UTC day.
    pub async fn daily_requests(&self, tenant_id: &str) -> Result<u64, GatewayError> {
        let since = start_of_day(Utc::now());
        let records = self.store.for_tenant_since(tenant_id, since).await?;
        Ok(records.len() as u64)
    }

    /// Aggregate a tenant's records for the period, grouped by provider and
    /// by model.
    pub async fn summary(
        &self,
        tenant_id: &str,
        period: SummaryPeriod,
    ) -> Result<UsageSummary, GatewayError> {
        let now = Utc::now();
        let since = match period {
            SummaryPeriod::Day => start_of_day(now),
            SummaryPeriod::Week => now - ChronoDuration::days(7),
            SummaryPeriod::Month => start_of_month(now),
        };
        let records = self.store.for_tenant_since(tenant_id, since).await?;

        let mut summary = UsageSummary {
            period,
            total_requests: 0,
            total_tokens: 0,
            total_cost_usd: 0.0,
            by_provider: HashMap::new(),
            by_model: HashMap::new(),
        };
        for record in &records {
            summary.total_requests += 1;
            summary.total_tokens += record.total_tokens as u64;
            summary.total_cost_usd += record.cost_usd;

            let provider = summary.by_provider.entry(record.provider.clone()).or_default();
            provider.requests += 1;
            provider.tokens += record.total_tokens as u64;
            provider.cost_usd += record.cost_usd;

            let model = summary.by_model.entry(record.model.clone()).or_default();
            model.requests += 1;
            model.tokens += record.total_tokens as u64;
            model.cost_usd += record.cost_usd;
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> UsageService {
        UsageService::new(Arc::new(InMemoryUsageStore::new()))
    }

    fn record(tenant: &str, provider: &str, model: &str, cost: f64, tokens: u32) -> UsageRecord {
        UsageRecord {
            provider: provider.to_string(),
            model: model.to_string(),
            cost_usd: cost,
            prompt_tokens: tokens / 2,
            completion_tokens: tokens - tokens / 2,
            total_tokens: tokens,
            ..UsageRecord::new(tenant, Uuid::new_v4().to_string())
        }
    }

    #[tokio::test]
    async fn test_monthly_spend_sums_costs() {
        let service = service();
        service.record(record("t1", "openai", "gpt-4o", 0.50, 100)).await.unwrap();
        service.record(record("t1", "openai", "gpt-4o", 0.49, 100)).await.unwrap();
        service.record(record("t2", "openai", "gpt-4o", 9.99, 100)).await.unwrap();

        let spend = service.monthly_spend("t1").await.unwrap();
        assert!((spend - 0.99).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_old_records_excluded_from_monthly_spend() {
        let store = Arc::new(InMemoryUsageStore::new());
        let service = UsageService::new(store.clone());

        let mut stale = record("t1", "openai", "gpt-4o", 5.0, 100);
        stale.created_at = Utc::now() - ChronoDuration::days(45);
        store.append(stale).await.unwrap();
        service.record(record("t1", "openai", "gpt-4o", 0.25, 100)).await.unwrap();

        let spend = service.monthly_spend("t1").await.unwrap();
        assert!((spend - 0.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_daily_request_count() {
        let service = service();
        for _ in 0..3 {
            service.record(record("t1", "openai", "gpt-4o", 0.0, 10)).await.unwrap();
        }
        assert_eq!(service.daily_requests("t1").await.unwrap(), 3);
        assert_eq!(service.daily_requests("t2").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_summary_groups_by_provider_and_model() {
        let service = service();
        service.record(record("t1", "openai", "gpt-4o", 0.10, 100)).await.unwrap();
        service.record(record("t1", "openai", "gpt-4o-mini", 0.01, 50)).await.unwrap();
        service.record(record("t1", "anthropic", "claude-3-haiku", 0.02, 80)).await.unwrap();

        let summary = service.summary("t1", SummaryPeriod::Month).await.unwrap();
        assert_eq!(summary.total_requests, 3);
        assert_eq!(summary.total_tokens, 230);
        assert_eq!(summary.by_provider["openai"].requests, 2);
        assert_eq!(summary.by_provider["anthropic"].requests, 1);
        assert_eq!(summary.by_model["gpt-4o-mini"].tokens, 50);
    }
}
