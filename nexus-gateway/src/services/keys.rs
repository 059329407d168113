//! API key model, store interface, and verification service.
//!
//! A key's raw secret is `nxs_` followed by 40 alphanumeric characters
//! (over 128 bits of entropy). Only a SHA-256 digest is stored, together
//! with a short public prefix for indexed lookup; the raw secret is
//! returned exactly once at creation time. Verification hashes the
//! presented secret and compares digests in constant time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::gateway_error::GatewayError;

/// Public prefix every Nexus key starts with.
pub const KEY_PREFIX: &str = "nxs_";
/// Length of the random part of a secret.
const SECRET_LEN: usize = 40;
/// Length of the indexable public prefix, `nxs_` included.
const PREFIX_LEN: usize = 12;

/// Key lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    #[default]
    Active,
    Revoked,
}

/// A stored API key. Never contains the raw secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    /// Short public prefix for indexed lookup.
    pub prefix: String,
    /// Hex-encoded SHA-256 digest of the full secret.
    pub secret_hash: String,
    pub scopes: Vec<String>,
    pub status: KeyStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }
}

/// Input for key creation.
#[derive(Debug, Clone, Default)]
pub struct CreateKey {
    pub name: String,
    pub scopes: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, String>,
}

/// Creation result. `secret` is handed out exactly once.
#[derive(Debug, Clone)]
pub struct CreatedKey {
    pub key: ApiKey,
    pub secret: String,
}

/// Generate a fresh raw secret.
pub fn generate_secret() -> String {
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LEN)
        .map(char::from)
        .collect();
    format!("{KEY_PREFIX}{random}")
}

/// Hex SHA-256 digest of a secret.
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Indexable public prefix of a secret.
pub fn prefix_of(secret: &str) -> &str {
    &secret[..secret.len().min(PREFIX_LEN)]
}

/// Byte comparison without early exit, so verification latency does not
/// depend on where the first mismatch sits.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Persistence seam for API keys.
#[async_trait]
pub trait KeyStore: Send + Sync {
    async fn insert(&self, key: ApiKey) -> Result<(), GatewayError>;
    async fn get(&self, id: &str) -> Result<Option<ApiKey>, GatewayError>;
    /// The single active key carrying `prefix`, if any.
    async fn find_active_by_prefix(&self, prefix: &str) -> Result<Option<ApiKey>, GatewayError>;
    async fn update(&self, key: ApiKey) -> Result<(), GatewayError>;
    async fn list_for_tenant(&self, tenant_id: &str) -> Result<Vec<ApiKey>, GatewayError>;
}

/// Concurrent in-memory key store.
#[derive(Default)]
pub struct InMemoryKeyStore {
    keys: DashMap<String, ApiKey>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyStore for InMemoryKeyStore {
    async fn insert(&self, key: ApiKey) -> Result<(), GatewayError> {
        // (prefix, active) is unique across the store.
        if key.status == KeyStatus::Active
            && self
                .keys
                .iter()
                .any(|k| k.status == KeyStatus::Active && k.prefix == key.prefix)
        {
            return Err(GatewayError::Configuration {
                message: format!("active key prefix already exists: {}", key.prefix),
            });
        }
        self.keys.insert(key.id.clone(), key);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<ApiKey>, GatewayError> {
        Ok(self.keys.get(id).map(|k| k.clone()))
    }

    async fn find_active_by_prefix(&self, prefix: &str) -> Result<Option<ApiKey>, GatewayError> {
        Ok(self
            .keys
            .iter()
            .find(|k| k.status == KeyStatus::Active && k.prefix == prefix)
            .map(|k| k.clone()))
    }

    async fn update(&self, key: ApiKey) -> Result<(), GatewayError> {
        self.keys.insert(key.id.clone(), key);
        Ok(())
    }

    async fn list_for_tenant(&self, tenant_id: &str) -> Result<Vec<ApiKey>, GatewayError> {
        Ok(self
            .keys
            .iter()
            .filter(|k| k.tenant_id == tenant_id)
            .map(|k| k.clone())
            .collect())
    }
}

/// Key issuance and verification over an injected store.
#[derive(Clone)]
pub struct KeyService {
    store: Arc<dyn KeyStore>,
}

impl KeyService {
    pub fn new(store: Arc<dyn KeyStore>) -> Self {
        Self { store }
    }

    /// Mint a key for a tenant. The returned raw secret is not recoverable
    /// afterwards.
    pub async fn create(
        &self,
        tenant_id: &str,
        input: CreateKey,
    ) -> Result<CreatedKey, GatewayError> {
        let secret = generate_secret();
        let key = ApiKey {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            name: input.name,
            prefix: prefix_of(&secret).to_string(),
            secret_hash: hash_secret(&secret),
            scopes: input.scopes,
            status: KeyStatus::Active,
            expires_at: input.expires_at,
            last_used_at: None,
            metadata: input.metadata,
            created_at: Utc::now(),
        };
        self.store.insert(key.clone()).await?;
        tracing::info!(key_id = %key.id, tenant_id = %tenant_id, prefix = %key.prefix, "api key created");
        Ok(CreatedKey { key, secret })
    }

    /// Verify a presented secret: active, unexpired, digest match.
    pub async fn verify(&self, presented: &str) -> Result<ApiKey, GatewayError> {
        if !presented.starts_with(KEY_PREFIX) || presented.len() < PREFIX_LEN {
            return Err(GatewayError::KeyInvalid);
        }
        let key = self
            .store
            .find_active_by_prefix(prefix_of(presented))
            .await?
            .ok_or(GatewayError::KeyInvalid)?;

        if key.status == KeyStatus::Revoked || key.is_expired() {
            return Err(GatewayError::KeyRevoked);
        }

        let presented_hash = hash_secret(presented);
        if !constant_time_eq(presented_hash.as_bytes(), key.secret_hash.as_bytes()) {
            return Err(GatewayError::KeyInvalid);
        }

        let mut touched = key.clone();
        touched.last_used_at = Some(Utc::now());
        // Last-use tracking is best effort.
        if let Err(err) = self.store.update(touched.clone()).await {
            tracing::warn!(key_id = %key.id, error = %err, "failed to touch key last_used_at");
        }
        Ok(touched)
    }

    pub async fn revoke(&self, id: &str) -> Result<(), GatewayError> {
        let mut key = self
            .store
            .get(id)
            .await?
            .ok_or(GatewayError::KeyInvalid)?;
        key.status = KeyStatus::Revoked;
        self.store.update(key).await
    }

    pub async fn list_for_tenant(&self, tenant_id: &str) -> Result<Vec<ApiKey>, GatewayError> {
        self.store.list_for_tenant(tenant_id).await
    }
}
