//! # Credential Provider
//!
//! Runtime lookup of per-provider secrets. Adapters constructed with a
//! static key bypass this entirely; adapters configured with a dynamic
//! credential source consult it at request time, so rotation needs no
//! restart. Lookup failures surface as provider failures.

use crate::error::ProviderError;
use std::collections::HashMap;

/// Source of per-provider secrets.
#[async_trait::async_trait]
pub trait CredentialProvider: Send + Sync {
    /// The secret for `provider`, or [`ProviderError::CredentialNotFound`].
    async fn get_credential(&self, provider: &str) -> Result<String, ProviderError>;
}

/// Fixed in-memory credential map.
#[derive(Default)]
pub struct StaticCredentials {
    secrets: HashMap<String, String>,
}

impl StaticCredentials {
    pub fn new(secrets: HashMap<String, String>) -> Self {
        Self { secrets }
    }

    pub fn with(mut self, provider: impl Into<String>, secret: impl Into<String>) -> Self {
        self.secrets.insert(provider.into(), secret.into());
        self
    }
}

#[async_trait::async_trait]
impl CredentialProvider for StaticCredentials {
    async fn get_credential(&self, provider: &str) -> Result<String, ProviderError> {
        self.secrets
            .get(provider)
            .cloned()
            .ok_or_else(|| ProviderError::CredentialNotFound {
                provider: provider.to_string(),
            })
    }
}

/// Environment-backed credentials: `<PREFIX><PROVIDER>_API_KEY`, provider
/// name uppercased.
pub struct EnvCredentials {
    prefix: String,
}

impl EnvCredentials {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn var_name(&self, provider: &str) -> String {
        format!("{}{}_API_KEY", self.prefix, provider.to_uppercase())
    }
}

#[async_trait::async_trait]
impl CredentialProvider for EnvCredentials {
    async fn get_credential(&self, provider: &str) -> Result<String, ProviderError> {
        std::env::var(self.var_name(provider)).map_err(|_| ProviderError::CredentialNotFound {
            provider: provider.to_string(),
        })
    }
}
