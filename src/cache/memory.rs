use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{CacheError, KeyValueStore, clamp_ttl};

struct Entry {
    value: String,
    /// `None` for counters created by `incr`.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-process store with lazy expiry.
///
/// Uses the tokio clock so tests can advance time with `tokio::time::advance`.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of stored entries, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn expiry(ttl_secs: u64) -> Option<Instant> {
        Some(Instant::now() + Duration::from_secs(clamp_ttl(ttl_secs)))
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), CacheError> {
        self.entries().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Self::expiry(ttl_secs),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let now = Instant::now();
        Ok(self
            .entries()
            .remove(key)
            .is_some_and(|entry| entry.is_live(now)))
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.get(key).await?.is_some())
    }

    async fn incr(&self, key: &str) -> Result<i64, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries();
        let (current, expires_at) = match entries.get(key).filter(|entry| entry.is_live(now)) {
            Some(entry) => (
                entry
                    .value
                    .parse::<i64>()
                    .map_err(|e| CacheError::Serialization(e.to_string()))?,
                entry.expires_at,
            ),
            None => (0, None),
        };
        let next = current + 1;
        entries.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn replace(
        &self,
        old_key: &str,
        new_key: &str,
        value: &str,
        ttl_secs: u64,
    ) -> Result<(), CacheError> {
        let mut entries = self.entries();
        entries.remove(old_key);
        entries.insert(
            new_key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Self::expiry(ttl_secs),
            },
        );
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        Ok((before - entries.len()) as u64)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}
