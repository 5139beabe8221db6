// lib/src/storage_engine/mod.rs
// Declares storage engine submodules and the create_storage factory.

use log::{debug, error, info};
use std::sync::Arc;
use anyhow::{anyhow, Result};

pub mod storage_engine;
pub mod inmemory_storage;
#[cfg(feature = "redis-datastore")]
pub mod redis_storage;

pub use storage_engine::KvStore;
pub use inmemory_storage::InMemoryStorage;
#[cfg(feature = "redis-datastore")]
pub use redis_storage::RedisStorage;

use crate::config::{StorageConfig, StorageEngineType};

/// Creates a key-value store instance based on the provided configuration.
///
/// Redis is the production engine (enabled by the "redis-datastore"
/// feature); InMemory backs tests and local development.
pub async fn create_storage(config: &StorageConfig) -> Result<Arc<dyn KvStore>> {
    debug!("Creating storage with config: {:?}", config);

    let storage: Arc<dyn KvStore> = match config.storage_engine_type {
        StorageEngineType::Redis => {
            #[cfg(feature = "redis-datastore")]
            {
                match RedisStorage::from_config(config).await {
                    Ok(storage) => {
                        info!("Created Redis storage");
                        Arc::new(storage)
                    }
                    Err(e) => {
                        error!("Failed to create Redis storage: {}", e);
                        return Err(anyhow!("Failed to create Redis storage: {}", e));
                    }
                }
            }
            #[cfg(not(feature = "redis-datastore"))]
            {
                error!("Redis support is not enabled in this build");
                return Err(anyhow!("Redis support is not enabled. Use InMemory."));
            }
        }
        StorageEngineType::InMemory => {
            let storage = Arc::new(InMemoryStorage::new());
            info!("Created InMemory storage");
            storage
        }
    };

    storage.connect().await.map_err(|e| {
        error!(
            "Failed to connect storage engine {}: {}",
            config.storage_engine_type, e
        );
        anyhow!("Failed to connect storage engine: {}", e)
    })?;

    Ok(storage)
}
