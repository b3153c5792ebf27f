//! Refresh token registry.
//!
//! A refresh token is honoured only while its JTI is present here. Entries
//! live under `refresh:{jti}` and expire with the token.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::cache::{CacheError, KeyValueStore};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegistryEntry {
    user_id: String,
    /// Unix seconds
    expires_at: u64,
}

fn registry_key(jti: &str) -> String {
    format!("refresh:{jti}")
}

fn entry_json(user_id: &str, ttl_secs: u64) -> Result<String, CacheError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let entry = RegistryEntry {
        user_id: user_id.to_string(),
        expires_at: now + ttl_secs,
    };
    Ok(serde_json::to_string(&entry)?)
}

#[derive(Clone)]
pub struct RefreshRegistry {
    store: Arc<dyn KeyValueStore>,
}

impl RefreshRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Record a JTI as valid for `ttl_secs`.
    pub async fn store(&self, jti: &str, user_id: &str, ttl_secs: u64) -> Result<(), CacheError> {
        let value = entry_json(user_id, ttl_secs)?;
        self.store
            .set_ex(&registry_key(jti), &value, ttl_secs)
            .await
    }

    pub async fn exists(&self, jti: &str) -> Result<bool, CacheError> {
        self.store.exists(&registry_key(jti)).await
    }

    /// Remove a JTI. Returns whether it was present; revoking twice is fine.
    pub async fn revoke(&self, jti: &str) -> Result<bool, CacheError> {
        self.store.delete(&registry_key(jti)).await
    }

    /// Invalidate `old_jti` and record `new_jti` in one atomic store operation.
    pub async fn rotate(
        &self,
        old_jti: &str,
        new_jti: &str,
        user_id: &str,
        ttl_secs: u64,
    ) -> Result<(), CacheError> {
        let value = entry_json(user_id, ttl_secs)?;
        self.store
            .replace(
                &registry_key(old_jti),
                &registry_key(new_jti),
                &value,
                ttl_secs,
            )
            .await
    }
}
