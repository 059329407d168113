//! Tenant model, store interface, and CRUD service.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::gateway_error::GatewayError;

/// Lifecycle status of a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    #[default]
    Active,
    Disabled,
    Suspended,
}

/// Tenant quota limits. Zero means unlimited.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct TenantQuota {
    /// Requests per minute.
    pub rpm: u32,
    /// Tokens per minute.
    pub tpm: u32,
    /// Requests per calendar day.
    pub daily_requests: u32,
    /// Monthly spend cap in USD.
    pub monthly_budget_usd: f64,
    /// Token ceiling for a single request.
    pub max_tokens_per_request: u32,
}

/// Per-tenant behavior overrides.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TenantConfig {
    /// When non-empty, only these models are allowed.
    #[serde(default)]
    pub allowed_models: Vec<String>,
    /// Models always rejected for this tenant.
    #[serde(default)]
    pub blocked_models: Vec<String>,
    /// Model substituted when a request names none.
    #[serde(default)]
    pub default_model: Option<String>,
    /// Routing strategy override by name.
    #[serde(default)]
    pub routing_strategy: Option<String>,
    /// Guardrail policy override by name.
    #[serde(default)]
    pub guard_policy: Option<String>,
    /// Cache opt-out; `None` follows the gateway default.
    #[serde(default)]
    pub enable_cache: Option<bool>,
}

/// An isolated customer account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    /// URL-safe unique identifier.
    pub slug: String,
    pub status: TenantStatus,
    pub quota: TenantQuota,
    pub config: TenantConfig,
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    pub fn is_active(&self) -> bool {
        self.status == TenantStatus::Active
    }

    /// Whether this tenant may use `model` per its allow and block lists.
    pub fn allows_model(&self, model: &str) -> bool {
        if self.config.blocked_models.iter().any(|m| m == model) {
            return false;
        }
        if self.config.allowed_models.is_empty() {
            return true;
        }
        self.config.allowed_models.iter().any(|m| m == model)
    }
}

/// Input for tenant creation.
#[derive(Debug, Clone, Default)]
pub struct CreateTenant {
    pub name: String,
    pub slug: String,
    pub quota: TenantQuota,
    pub config: TenantConfig,
    pub metadata: HashMap<String, String>,
}

/// Persistence seam for tenants.
#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn insert(&self, tenant: Tenant) -> Result<(), GatewayError>;
    async fn get(&self, id: &str) -> Result<Option<Tenant>, GatewayError>;
    async fn get_by_slug(&self, slug: &str) -> Result<Option<Tenant>, GatewayError>;
    async fn update(&self, tenant: Tenant) -> Result<(), GatewayError>;
    async fn delete(&self, id: &str) -> Result<(), GatewayError>;
    async fn list(&self) -> Result<Vec<Tenant>, GatewayError>;
}

/// Concurrent in-memory tenant store.
#[derive(Default)]
pub struct InMemoryTenantStore {
    tenants: DashMap<String, Tenant>,
    slugs: DashMap<String, String>,
}

impl InMemoryTenantStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TenantStore for InMemoryTenantStore {
    async fn insert(&self, tenant: Tenant) -> Result<(), GatewayError> {
        if self.slugs.contains_key(&tenant.slug) {
            return Err(GatewayError::Configuration {
                message: format!("tenant slug already exists: {}", tenant.slug),
            });
        }
        self.slugs.insert(tenant.slug.clone(), tenant.id.clone());
        self.tenants.insert(tenant.id.clone(), tenant);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Tenant>, GatewayError> {
        Ok(self.tenants.get(id).map(|t| t.clone()))
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Tenant>, GatewayError> {
        match self.slugs.get(slug) {
            Some(id) => self.get(&id).await,
            None => Ok(None),
        }
    }

    async fn update(&self, tenant: Tenant) -> Result<(), GatewayError> {
        match self.tenants.get(&tenant.id) {
            Some(existing) => {
                let old_slug = existing.slug.clone();
                drop(existing);
                if old_slug != tenant.slug {
                    if self.slugs.contains_key(&tenant.slug) {
                        return Err(GatewayError::Configuration {
                            message: format!("tenant slug already exists: {}", tenant.slug),
                        });
                    }
                    self.slugs.remove(&old_slug);
                    self.slugs.insert(tenant.slug.clone(), tenant.id.clone());
                }
                self.tenants.insert(tenant.id.clone(), tenant);
                Ok(())
            }
            None => Err(GatewayError::TenantNotFound { tenant: tenant.id }),
        }
    }

    async fn delete(&self, id: &str) -> Result<(), GatewayError> {
        if let Some((_, tenant)) = self.tenants.remove(id) {
            self.slugs.remove(&tenant.slug);
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Tenant>, GatewayError> {
        Ok(self.tenants.iter().map(|t| t.clone()).collect())
    }
}

fn valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

/// Tenant CRUD and status transitions over an injected store.
#[derive(Clone)]
pub struct TenantService {
    store: Arc<dyn TenantStore>,
}

impl TenantService {
    pub fn new(store: Arc<dyn TenantStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, input: CreateTenant) -> Result<Tenant, GatewayError> {
        if input.name.is_empty() {
            return Err(GatewayError::Configuration {
                message: "tenant name is required".to_string(),
            });
        }
        if !valid_slug(&input.slug) {
            return Err(GatewayError::Configuration {
                message: format!("tenant slug must be URL-safe: {:?}", input.slug),
            });
        }
        let now = Utc::now();
        let tenant = Tenant {
            id: Uuid::new_v4().to_string(),
            name: input.name,
            slug: input.slug,
            status: TenantStatus::Active,
            quota: input.quota,
            config: input.config,
            metadata: input.metadata,
            created_at: now,
            updated_at: now,
        };
        self.store.insert(tenant.clone()).await?;
        tracing::info!(tenant_id = %tenant.id, slug = %tenant.slug, "tenant created");
        Ok(tenant)
    }

    pub async fn get(&self, id: &str) -> Result<Tenant, GatewayError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| GatewayError::TenantNotFound { tenant: id.to_string() })
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Tenant, GatewayError> {
        self.store
            .get_by_slug(slug)
            .await?
            .ok_or_else(|| GatewayError::TenantNotFound { tenant: slug.to_string() })
    }

    /// Copy-on-write update via a mutation closure, touching `updated_at`.
    pub async fn update<F>(&self, id: &str, mutate: F) -> Result<Tenant, GatewayError>
    where
        F: FnOnce(&mut Tenant),
    {
        let mut tenant = self.get(id).await?;
        mutate(&mut tenant);
        if !valid_slug(&tenant.slug) {
            return Err(GatewayError::Configuration {
                message: format!("tenant slug must be URL-safe: {:?}", tenant.slug),
            });
        }
        tenant.updated_at = Utc::now();
        self.store.update(tenant.clone()).await?;
        Ok(tenant)
    }

    pub async fn set_status(&self, id: &str, status: TenantStatus) -> Result<Tenant, GatewayError> {
        self.update(id, |t| t.status = status).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), GatewayError> {
        self.store.delete(id).await
    }

    pub async fn list(&self) -> Result<Vec<Tenant>, GatewayError> {
        self.store.list().await
    }
}
