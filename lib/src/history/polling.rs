// lib/src/history/polling.rs
// Flat list of in-flight polling tasks under one short-TTL key. Entries
// past the age window are dropped whenever the list is read; there is no
// background sweep.

use std::sync::Arc;
use chrono::{Duration, Utc};
use log::debug;

use models::errors::{BrokerError, BrokerResult};
use models::history::PollingTask;

use crate::keys;
use crate::storage_engine::KvStore;

#[derive(Debug, Clone)]
pub struct PollingTaskList {
    store: Arc<dyn KvStore>,
    max_age_secs: i64,
    ttl_secs: u64,
}

impl PollingTaskList {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        PollingTaskList {
            store,
            max_age_secs: keys::POLLING_TASK_MAX_AGE_SECS,
            ttl_secs: keys::POLLING_TASKS_TTL_SECS,
        }
    }

    pub fn with_window(store: Arc<dyn KvStore>, max_age_secs: i64, ttl_secs: u64) -> Self {
        PollingTaskList {
            store,
            max_age_secs,
            ttl_secs,
        }
    }

    async fn load(&self) -> BrokerResult<Vec<PollingTask>> {
        match self.store.get(keys::POLLING_TASKS_KEY).await? {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| BrokerError::DeserializationError(e.to_string())),
            None => Ok(Vec::new()),
        }
    }

    async fn persist(&self, tasks: &[PollingTask]) -> BrokerResult<()> {
        let json = serde_json::to_string(tasks)?;
        self.store
            .set_with_ttl(keys::POLLING_TASKS_KEY, &json, self.ttl_secs)
            .await
    }

    /// Reads the list, opportunistically dropping entries older than the
    /// age window. The pruned list is written back only when something was
    /// actually dropped.
    pub async fn read(&self) -> BrokerResult<Vec<PollingTask>> {
        let tasks = self.load().await?;
        let cutoff = Utc::now() - Duration::seconds(self.max_age_secs);
        let fresh: Vec<PollingTask> = tasks
            .iter()
            .filter(|task| task.started_at > cutoff)
            .cloned()
            .collect();
        if fresh.len() != tasks.len() {
            debug!("Pruned {} stale polling tasks", tasks.len() - fresh.len());
            self.persist(&fresh).await?;
        }
        Ok(fresh)
    }

    /// Adds the task or replaces the entry with the same task id.
    pub async fn upsert(&self, task: PollingTask) -> BrokerResult<()> {
        let mut tasks = self.read().await?;
        tasks.retain(|existing| existing.task_id != task.task_id);
        tasks.push(task);
        self.persist(&tasks).await
    }

    pub async fn find(&self, task_id: &str) -> BrokerResult<Option<PollingTask>> {
        Ok(self
            .read()
            .await?
            .into_iter()
            .find(|task| task.task_id == task_id))
    }

    /// Increments the attempt counter, returning the new count. Missing
    /// entries (pruned or never registered) yield None.
    pub async fn bump_attempts(&self, task_id: &str) -> BrokerResult<Option<u32>> {
        let mut tasks = self.read().await?;
        let mut bumped = None;
        for task in tasks.iter_mut() {
            if task.task_id == task_id {
                task.attempts += 1;
                bumped = Some(task.attempts);
            }
        }
        if bumped.is_some() {
            self.persist(&tasks).await?;
        }
        Ok(bumped)
    }

    pub async fn remove(&self, task_id: &str) -> BrokerResult<()> {
        let mut tasks = self.read().await?;
        let before = tasks.len();
        tasks.retain(|task| task.task_id != task_id);
        if tasks.len() != before {
            self.persist(&tasks).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::storage_engine::InMemoryStorage;

    fn task(id: &str, age_secs: i64) -> PollingTask {
        PollingTask {
            task_id: id.to_string(),
            history_id: format!("h-{}", id),
            attempts: 0,
            started_at: Utc::now() - Duration::seconds(age_secs),
        }
    }

    fn list() -> PollingTaskList {
        PollingTaskList::with_window(Arc::new(InMemoryStorage::new()), 1800, 3600)
    }

    #[tokio::test]
    async fn should_prune_stale_entries_on_read() {
        let polling = list();
        polling.upsert(task("fresh", 60)).await.unwrap();
        polling.upsert(task("stale", 3000)).await.unwrap();

        let tasks = polling.read().await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].task_id, "fresh");
    }

    #[tokio::test]
    async fn should_replace_entry_on_upsert_with_same_task_id() {
        let polling = list();
        polling.upsert(task("t-1", 60)).await.unwrap();
        let mut updated = task("t-1", 30);
        updated.attempts = 5;
        polling.upsert(updated).await.unwrap();

        let tasks = polling.read().await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].attempts, 5);
    }

    #[tokio::test]
    async fn should_bump_attempts_only_for_known_tasks() {
        let polling = list();
        polling.upsert(task("t-1", 60)).await.unwrap();
        assert_eq!(polling.bump_attempts("t-1").await.unwrap(), Some(1));
        assert_eq!(polling.bump_attempts("t-1").await.unwrap(), Some(2));
        assert_eq!(polling.bump_attempts("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn should_remove_entries() {
        let polling = list();
        polling.upsert(task("t-1", 60)).await.unwrap();
        polling.remove("t-1").await.unwrap();
        assert!(polling.read().await.unwrap().is_empty());
    }
}
