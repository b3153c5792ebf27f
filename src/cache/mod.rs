//! Shared key-value store used by the refresh registry, the role cache and
//! the availability cache.
//!
//! Two backends implement [`KeyValueStore`]: Redis for multi-instance
//! deployments and an in-process map when no Redis URL is configured.

mod memory;
mod redis_store;

use async_trait::async_trait;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// Errors from the backing store.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
    #[error("cache serialization error: {0}")]
    Serialization(String),
}

impl From<::redis::RedisError> for CacheError {
    fn from(e: ::redis::RedisError) -> Self {
        CacheError::Unavailable(e.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Serialization(e.to_string())
    }
}

/// Minimal key-value capability with per-key expiry.
///
/// TTLs are in whole seconds; a TTL of zero is treated as one second.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), CacheError>;

    /// Returns true if the key existed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Increment an integer counter, creating it at 1 without expiry.
    async fn incr(&self, key: &str) -> Result<i64, CacheError>;

    /// Delete `old_key` and set `new_key` as a single atomic operation.
    async fn replace(
        &self,
        old_key: &str,
        new_key: &str,
        value: &str,
        ttl_secs: u64,
    ) -> Result<(), CacheError>;

    /// Drop expired entries. Stores with native expiry have nothing to do.
    async fn purge_expired(&self) -> Result<u64, CacheError> {
        Ok(0)
    }

    /// Round-trip to the backend, used at startup.
    async fn ping(&self) -> Result<(), CacheError>;
}

pub(crate) fn clamp_ttl(ttl_secs: u64) -> u64 {
    ttl_secs.max(1)
}
