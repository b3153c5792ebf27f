use ::redis::{AsyncCommands, Client, aio::ConnectionManager};
use async_trait::async_trait;
use tracing::info;

use super::{CacheError, KeyValueStore, clamp_ttl};

/// Redis-backed store. The connection manager reconnects on its own, so a
/// Redis restart shows up as a few `Unavailable` errors rather than a dead
/// handle.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        info!("Connecting to Redis...");

        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;

        info!("Redis connection established");
        Ok(Self { connection })
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        let _: () = conn.set_ex(key, value, clamp_ttl(ttl_secs)).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection.clone();
        let deleted: i64 = conn.del(key).await?;
        Ok(deleted > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection.clone();
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn incr(&self, key: &str) -> Result<i64, CacheError> {
        let mut conn = self.connection.clone();
        let value: i64 = conn.incr(key, 1i64).await?;
        Ok(value)
    }

    async fn replace(
        &self,
        old_key: &str,
        new_key: &str,
        value: &str,
        ttl_secs: u64,
    ) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        let _: () = ::redis::pipe()
            .atomic()
            .del(old_key)
            .ignore()
            .set_ex(new_key, value, clamp_ttl(ttl_secs))
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        let pong: String = ::redis::cmd("PING").query_async(&mut conn).await?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(CacheError::Unavailable(format!("unexpected PING reply: {pong}")))
        }
    }
}
