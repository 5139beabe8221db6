// lib/src/storage_engine/redis_storage.rs
// NOTE: Uses plain Redis SET/GET/DEL plus SADD/SREM/SMEMBERS; namespacing
// is handled by the key schema in lib::keys, not here.

use std::sync::Arc;
use async_trait::async_trait;
use redis::{AsyncCommands, Client};
use tokio::sync::Mutex;

use models::errors::{BrokerError, BrokerResult};

use crate::config::StorageConfig;
use crate::storage_engine::KvStore;

pub struct RedisStorage {
    connection: Arc<Mutex<redis::aio::MultiplexedConnection>>,
}

impl std::fmt::Debug for RedisStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStorage").finish_non_exhaustive()
    }
}

impl RedisStorage {
    pub fn new(connection: redis::aio::MultiplexedConnection) -> Self {
        RedisStorage {
            connection: Arc::new(Mutex::new(connection)),
        }
    }

    pub async fn from_config(config: &StorageConfig) -> BrokerResult<Self> {
        let client = Client::open(
            config
                .connection_string
                .as_deref()
                .ok_or_else(|| {
                    BrokerError::ConfigurationError(
                        "Redis connection string is required".to_string(),
                    )
                })?,
        )
        .map_err(|e| BrokerError::StorageError(format!("Failed to create Redis client: {}", e)))?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BrokerError::StorageError(format!("Failed to connect to Redis: {}", e)))?;
        Ok(RedisStorage::new(connection))
    }
}

#[async_trait]
impl KvStore for RedisStorage {
    async fn connect(&self) -> BrokerResult<()> {
        let mut conn = self.connection.lock().await;
        let _: String = redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| BrokerError::StorageError(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> BrokerResult<Option<String>> {
        let mut conn = self.connection.lock().await;
        conn.get(key)
            .await
            .map_err(|e| BrokerError::StorageError(e.to_string()))
    }

    async fn set(&self, key: &str, value: &str) -> BrokerResult<()> {
        let mut conn = self.connection.lock().await;
        conn.set::<_, _, ()>(key, value)
            .await
            .map_err(|e| BrokerError::StorageError(e.to_string()))?;
        Ok(())
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> BrokerResult<()> {
        let mut conn = self.connection.lock().await;
        conn.set_ex::<_, _, ()>(key, value, ttl_secs)
            .await
            .map_err(|e| BrokerError::StorageError(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> BrokerResult<()> {
        let mut conn = self.connection.lock().await;
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| BrokerError::StorageError(e.to_string()))?;
        Ok(())
    }

    async fn set_add(&self, key: &str, member: &str) -> BrokerResult<()> {
        let mut conn = self.connection.lock().await;
        conn.sadd::<_, _, ()>(key, member)
            .await
            .map_err(|e| BrokerError::StorageError(e.to_string()))?;
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> BrokerResult<()> {
        let mut conn = self.connection.lock().await;
        conn.srem::<_, _, ()>(key, member)
            .await
            .map_err(|e| BrokerError::StorageError(e.to_string()))?;
        Ok(())
    }

    async fn set_members(&self, key: &str) -> BrokerResult<Vec<String>> {
        let mut conn = self.connection.lock().await;
        conn.smembers(key)
            .await
            .map_err(|e| BrokerError::StorageError(e.to_string()))
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> BrokerResult<()> {
        let mut conn = self.connection.lock().await;
        conn.expire::<_, i64>(key, ttl_secs as i64)
            .await
            .map_err(|e| BrokerError::StorageError(e.to_string()))?;
        Ok(())
    }

    fn get_type(&self) -> &'static str {
        "redis"
    }

    async fn close(&self) -> BrokerResult<()> {
        // The multiplexed connection is dropped with the struct.
        Ok(())
    }
}
