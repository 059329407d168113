//! Tenant, key, and usage services with their pluggable store interfaces.
//!
//! Persistence backends are external; the reference stores here are
//! in-memory and concurrent-safe, suitable for tests and single-process
//! deployments.

pub mod keys;
pub mod tenants;
pub mod usage;

pub use keys::{ApiKey, CreateKey, CreatedKey, InMemoryKeyStore, KeyService, KeyStatus, KeyStore};
pub use tenants::{
    CreateTenant, InMemoryTenantStore, Tenant, TenantConfig, TenantQuota, TenantService,
    TenantStatus, TenantStore,
};
pub use usage::{
    InMemoryUsageStore, SummaryPeriod, UsageBucket, UsageRecord, UsageService, UsageStore,
    UsageSummary,
};
