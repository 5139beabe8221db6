// lib/src/storage_engine/storage_engine.rs

use async_trait::async_trait;
use models::errors::BrokerResult;

/// Key-value operations the broker needs from its store: string values,
/// optional per-key TTLs, and membership sets for enumeration (the store
/// offers no list-keys-by-prefix guarantee at scale, so every enumerable
/// collection maintains its own index set).
#[async_trait]
pub trait KvStore: std::fmt::Debug + Send + Sync {
    async fn connect(&self) -> BrokerResult<()>;

    async fn get(&self, key: &str) -> BrokerResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> BrokerResult<()>;

    /// Set with a relative expiry. The TTL is absolute per write; rewriting
    /// a key resets its clock.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> BrokerResult<()>;

    async fn delete(&self, key: &str) -> BrokerResult<()>;

    async fn set_add(&self, key: &str, member: &str) -> BrokerResult<()>;

    async fn set_remove(&self, key: &str, member: &str) -> BrokerResult<()>;

    async fn set_members(&self, key: &str) -> BrokerResult<Vec<String>>;

    /// Refresh the expiry of an existing key; no-op when the key is absent.
    async fn expire(&self, key: &str, ttl_secs: u64) -> BrokerResult<()>;

    fn get_type(&self) -> &'static str;

    async fn close(&self) -> BrokerResult<()>;
}
