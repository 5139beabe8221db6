// lib/src/background.rs
// Write-behind queue for cache population that must not delay the primary
// response. The queue makes the eventual-consistency contract explicit:
// callers enqueue and move on, the worker retries once and logs what it
// could not write. Readers must tolerate cache misses in the gap.

use log::{error, info, warn};
use tokio::sync::mpsc;

use models::context::PatientContext;

use crate::context_cache::ContextCache;
use crate::retry::retry_with_backoff;

const QUEUE_DEPTH: usize = 256;
const WRITE_ATTEMPTS: u32 = 2;
const WRITE_RETRY_DELAY_MS: u64 = 500;

#[derive(Debug, Clone)]
pub enum BackgroundJob {
    /// Wholesale context write.
    StoreContext(PatientContext),
    /// Merge onto the existing snapshot.
    UpdateContext(PatientContext),
}

#[derive(Debug, Clone)]
pub struct BackgroundWriter {
    tx: mpsc::Sender<BackgroundJob>,
}

impl BackgroundWriter {
    /// Spawns the worker task and returns the enqueue handle. The worker
    /// lives until every handle is dropped.
    pub fn spawn(cache: ContextCache) -> Self {
        let (tx, mut rx) = mpsc::channel::<BackgroundJob>(QUEUE_DEPTH);
        tokio::spawn(async move {
            info!("Background cache writer started");
            while let Some(job) = rx.recv().await {
                let outcome = match &job {
                    BackgroundJob::StoreContext(context) => {
                        retry_with_backoff(
                            || cache.store(context),
                            WRITE_ATTEMPTS,
                            WRITE_RETRY_DELAY_MS,
                        )
                        .await
                    }
                    BackgroundJob::UpdateContext(context) => {
                        retry_with_backoff(
                            || async { cache.update(context).await.map(|_| ()) },
                            WRITE_ATTEMPTS,
                            WRITE_RETRY_DELAY_MS,
                        )
                        .await
                    }
                };
                if let Err(e) = outcome {
                    error!("Background cache write dropped after retries: {}", e);
                }
            }
            info!("Background cache writer stopped");
        });
        BackgroundWriter { tx }
    }

    /// Never blocks the caller; a full queue drops the write and logs it,
    /// which is the same soft-failure contract as the cache itself.
    pub fn enqueue(&self, job: BackgroundJob) {
        if let Err(e) = self.tx.try_send(job) {
            warn!("Background queue full, dropping cache write: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::{sleep, Duration};

    use crate::storage_engine::InMemoryStorage;

    #[tokio::test]
    async fn should_drain_queued_context_writes() {
        let store = Arc::new(InMemoryStorage::new());
        let cache = ContextCache::new(store);
        let writer = BackgroundWriter::spawn(cache.clone());

        let context = PatientContext {
            patient_id: Some("100".to_string()),
            patient_name: Some("Jo Doe".to_string()),
            ..Default::default()
        };
        writer.enqueue(BackgroundJob::StoreContext(context));

        // Eventual consistency: poll briefly rather than synchronize.
        let mut found = None;
        for _ in 0..50 {
            sleep(Duration::from_millis(10)).await;
            found = cache.get_by_patient("100").await.unwrap();
            if found.is_some() {
                break;
            }
        }
        assert_eq!(found.unwrap().patient_name.as_deref(), Some("Jo Doe"));
    }

    #[tokio::test]
    async fn should_merge_on_update_jobs() {
        let store = Arc::new(InMemoryStorage::new());
        let cache = ContextCache::new(store);
        cache
            .store(&PatientContext {
                patient_id: Some("100".to_string()),
                encounter_id: Some("E-7".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let writer = BackgroundWriter::spawn(cache.clone());
        writer.enqueue(BackgroundJob::UpdateContext(PatientContext {
            patient_id: Some("100".to_string()),
            physician_id: Some("D-3".to_string()),
            ..Default::default()
        }));

        let mut merged = None;
        for _ in 0..50 {
            sleep(Duration::from_millis(10)).await;
            merged = cache.get_by_patient("100").await.unwrap();
            if merged
                .as_ref()
                .map(|c| c.physician_id.is_some())
                .unwrap_or(false)
            {
                break;
            }
        }
        let merged = merged.unwrap();
        assert_eq!(merged.physician_id.as_deref(), Some("D-3"));
        assert_eq!(merged.encounter_id.as_deref(), Some("E-7"));
    }
}
