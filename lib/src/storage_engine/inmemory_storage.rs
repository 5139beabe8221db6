// lib/src/storage_engine/inmemory_storage.rs

use std::collections::{HashMap, HashSet};
use async_trait::async_trait;
use tokio::sync::Mutex as TokioMutex;
use tokio::time::{Duration, Instant};

use models::errors::BrokerResult;

use crate::storage_engine::KvStore;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(deadline) if deadline <= now)
    }
}

/// In-process store with the same contract as the Redis engine, including
/// lazy per-key expiry. Backs tests and local development.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    kv_store: TokioMutex<HashMap<String, Entry>>,
    sets: TokioMutex<HashMap<String, HashSet<String>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        InMemoryStorage {
            kv_store: TokioMutex::new(HashMap::new()),
            sets: TokioMutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl KvStore for InMemoryStorage {
    async fn connect(&self) -> BrokerResult<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> BrokerResult<Option<String>> {
        let mut kv_store = self.kv_store.lock().await;
        let now = Instant::now();
        if let Some(entry) = kv_store.get(key) {
            if entry.is_expired(now) {
                kv_store.remove(key);
                return Ok(None);
            }
            return Ok(Some(entry.value.clone()));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str) -> BrokerResult<()> {
        let mut kv_store = self.kv_store.lock().await;
        kv_store.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> BrokerResult<()> {
        let mut kv_store = self.kv_store.lock().await;
        kv_store.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs)),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> BrokerResult<()> {
        let mut kv_store = self.kv_store.lock().await;
        kv_store.remove(key);
        let mut sets = self.sets.lock().await;
        sets.remove(key);
        Ok(())
    }

    async fn set_add(&self, key: &str, member: &str) -> BrokerResult<()> {
        let mut sets = self.sets.lock().await;
        sets.entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> BrokerResult<()> {
        let mut sets = self.sets.lock().await;
        if let Some(members) = sets.get_mut(key) {
            members.remove(member);
            if members.is_empty() {
                sets.remove(key);
            }
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> BrokerResult<Vec<String>> {
        let sets = self.sets.lock().await;
        Ok(sets
            .get(key)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> BrokerResult<()> {
        let mut kv_store = self.kv_store.lock().await;
        if let Some(entry) = kv_store.get_mut(key) {
            entry.expires_at = Some(Instant::now() + Duration::from_secs(ttl_secs));
        }
        Ok(())
    }

    fn get_type(&self) -> &'static str {
        "inmemory"
    }

    async fn close(&self) -> BrokerResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn should_store_and_fetch_values() {
        let store = InMemoryStorage::new();
        store.set("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn should_expire_ttl_keys_lazily() {
        let store = InMemoryStorage::new();
        store.set_with_ttl("k", "v", 60).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn should_track_set_membership() {
        let store = InMemoryStorage::new();
        store.set_add("idx", "a").await.unwrap();
        store.set_add("idx", "b").await.unwrap();
        store.set_add("idx", "a").await.unwrap();
        let mut members = store.set_members("idx").await.unwrap();
        members.sort();
        assert_eq!(members, vec!["a", "b"]);
        store.set_remove("idx", "a").await.unwrap();
        assert_eq!(store.set_members("idx").await.unwrap(), vec!["b"]);
    }
}
