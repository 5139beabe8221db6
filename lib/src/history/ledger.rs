// lib/src/history/ledger.rs
// Eligibility-check ledger: one record per check attempt, mutated in place
// as polling observes new upstream states. Secondary index sets (clinic,
// task, patient, appointment) are kept consistent with the primary record
// on every create/update/delete.

use std::sync::Arc;
use chrono::Utc;
use log::{debug, warn};
use uuid::Uuid;

use models::errors::{BrokerError, BrokerResult};
use models::history::{EligibilityHistoryItem, EligibilityStatus, HistoryUpdate};

use crate::keys;
use crate::storage_engine::KvStore;

/// Fields a caller supplies when launching a check; everything else is
/// generated here.
#[derive(Debug, Clone, Default)]
pub struct NewHistoryItem {
    pub clinic_id: String,
    pub patient_id: String,
    pub task_id: String,
    pub appointment_id: Option<String>,
    pub patient_name: Option<String>,
    pub mpi: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HistoryLedger {
    store: Arc<dyn KvStore>,
    max_per_clinic: usize,
    item_ttl_secs: u64,
}

impl HistoryLedger {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        HistoryLedger {
            store,
            max_per_clinic: keys::MAX_HISTORY_PER_CLINIC,
            item_ttl_secs: keys::HISTORY_ITEM_TTL_SECS,
        }
    }

    pub fn with_retention(store: Arc<dyn KvStore>, max_per_clinic: usize, ttl_secs: u64) -> Self {
        HistoryLedger {
            store,
            max_per_clinic,
            item_ttl_secs: ttl_secs,
        }
    }

    pub async fn create(&self, new: NewHistoryItem) -> BrokerResult<EligibilityHistoryItem> {
        let item = EligibilityHistoryItem {
            id: Uuid::new_v4().to_string(),
            clinic_id: new.clinic_id,
            patient_id: new.patient_id,
            task_id: new.task_id,
            appointment_id: new.appointment_id,
            patient_name: new.patient_name,
            mpi: new.mpi,
            status: EligibilityStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
            result: None,
            interim_results: None,
            error: None,
            polling_attempts: 0,
        };
        self.write_item(&item).await?;
        self.add_indexes(&item).await?;
        self.enforce_retention(&item.clinic_id).await?;
        Ok(item)
    }

    pub async fn get(&self, id: &str) -> BrokerResult<Option<EligibilityHistoryItem>> {
        let raw = self.store.get(&keys::history_item(id)).await?;
        raw.map(|json| {
            serde_json::from_str(&json)
                .map_err(|e| BrokerError::DeserializationError(e.to_string()))
        })
        .transpose()
    }

    pub async fn get_by_task(&self, task_id: &str) -> BrokerResult<Option<EligibilityHistoryItem>> {
        match self.store.get(&keys::history_task_index(task_id)).await? {
            Some(id) => self.get(&id).await,
            None => Ok(None),
        }
    }

    /// Resolves either a record id or an external task id to the record.
    pub async fn resolve(&self, id_or_task: &str) -> BrokerResult<Option<EligibilityHistoryItem>> {
        if let Some(item) = self.get(id_or_task).await? {
            return Ok(Some(item));
        }
        self.get_by_task(id_or_task).await
    }

    /// Applies a partial update in place. Unknown ids are a not-found
    /// signal, never an implicit create. Repeating an identical update is
    /// a no-op for both the record and its indexes.
    pub async fn update(
        &self,
        id_or_task: &str,
        update: HistoryUpdate,
    ) -> BrokerResult<EligibilityHistoryItem> {
        let mut item = self
            .resolve(id_or_task)
            .await?
            .ok_or_else(|| BrokerError::not_found("history item", id_or_task))?;

        if let Some(status) = update.status {
            if status.is_terminal() && item.completed_at.is_none() {
                item.completed_at = Some(update.completed_at.unwrap_or_else(Utc::now));
            }
            item.status = status;
        }
        if let Some(completed_at) = update.completed_at {
            item.completed_at = Some(completed_at);
        }
        if let Some(result) = update.result {
            item.result = Some(result);
        }
        if let Some(interim) = update.interim_results {
            item.interim_results = Some(interim);
        }
        if let Some(error) = update.error {
            item.error = Some(error);
        }
        if let Some(attempts) = update.polling_attempts {
            item.polling_attempts = attempts;
        }

        self.write_item(&item).await?;
        Ok(item)
    }

    pub async fn delete(&self, id: &str) -> BrokerResult<()> {
        let item = self
            .get(id)
            .await?
            .ok_or_else(|| BrokerError::not_found("history item", id))?;
        self.remove_indexes(&item).await?;
        self.store.delete(&keys::history_item(id)).await?;
        Ok(())
    }

    pub async fn list_for_clinic(
        &self,
        clinic_id: &str,
    ) -> BrokerResult<Vec<EligibilityHistoryItem>> {
        let ids = self
            .store
            .set_members(&keys::history_clinic_index(clinic_id))
            .await?;
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get(&id).await? {
                Some(item) => items.push(item),
                // Item TTL'd out from under its index; drop the reference.
                None => {
                    self.store
                        .set_remove(&keys::history_clinic_index(clinic_id), &id)
                        .await?;
                }
            }
        }
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items)
    }

    pub async fn list_for_patient(
        &self,
        clinic_id: &str,
        patient_id: &str,
    ) -> BrokerResult<Vec<EligibilityHistoryItem>> {
        self.list_index(&keys::history_patient_index(clinic_id, patient_id))
            .await
    }

    pub async fn list_for_appointment(
        &self,
        clinic_id: &str,
        appointment_id: &str,
    ) -> BrokerResult<Vec<EligibilityHistoryItem>> {
        self.list_index(&keys::history_appointment_index(clinic_id, appointment_id))
            .await
    }

    async fn list_index(&self, index_key: &str) -> BrokerResult<Vec<EligibilityHistoryItem>> {
        let ids = self.store.set_members(index_key).await?;
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(item) = self.get(&id).await? {
                items.push(item);
            }
        }
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items)
    }

    async fn write_item(&self, item: &EligibilityHistoryItem) -> BrokerResult<()> {
        let json = serde_json::to_string(item)?;
        self.store
            .set_with_ttl(&keys::history_item(&item.id), &json, self.item_ttl_secs)
            .await
    }

    async fn add_indexes(&self, item: &EligibilityHistoryItem) -> BrokerResult<()> {
        self.store
            .set_add(&keys::history_clinic_index(&item.clinic_id), &item.id)
            .await?;
        self.store
            .set_with_ttl(
                &keys::history_task_index(&item.task_id),
                &item.id,
                self.item_ttl_secs,
            )
            .await?;
        self.store
            .set_add(
                &keys::history_patient_index(&item.clinic_id, &item.patient_id),
                &item.id,
            )
            .await?;
        if let Some(appointment_id) = &item.appointment_id {
            self.store
                .set_add(
                    &keys::history_appointment_index(&item.clinic_id, appointment_id),
                    &item.id,
                )
                .await?;
        }
        Ok(())
    }

    async fn remove_indexes(&self, item: &EligibilityHistoryItem) -> BrokerResult<()> {
        self.store
            .set_remove(&keys::history_clinic_index(&item.clinic_id), &item.id)
            .await?;
        self.store
            .delete(&keys::history_task_index(&item.task_id))
            .await?;
        self.store
            .set_remove(
                &keys::history_patient_index(&item.clinic_id, &item.patient_id),
                &item.id,
            )
            .await?;
        if let Some(appointment_id) = &item.appointment_id {
            self.store
                .set_remove(
                    &keys::history_appointment_index(&item.clinic_id, appointment_id),
                    &item.id,
                )
                .await?;
        }
        Ok(())
    }

    /// Evicts the oldest items beyond the per-clinic cap, indexes included,
    /// so nothing dangles.
    async fn enforce_retention(&self, clinic_id: &str) -> BrokerResult<()> {
        let items = self.list_for_clinic(clinic_id).await?;
        if items.len() <= self.max_per_clinic {
            return Ok(());
        }
        // list_for_clinic sorts newest first.
        for item in &items[self.max_per_clinic..] {
            debug!(
                "Evicting history item {} (created {}) for clinic {}",
                item.id, item.created_at, clinic_id
            );
            if let Err(e) = self.delete(&item.id).await {
                warn!("Failed to evict history item {}: {}", item.id, e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::history::InterimResults;

    use crate::storage_engine::InMemoryStorage;

    fn new_item(clinic: &str, patient: &str, task: &str) -> NewHistoryItem {
        NewHistoryItem {
            clinic_id: clinic.to_string(),
            patient_id: patient.to_string(),
            task_id: task.to_string(),
            appointment_id: Some(format!("appt-{}", task)),
            patient_name: None,
            mpi: None,
        }
    }

    fn ledger() -> HistoryLedger {
        HistoryLedger::new(Arc::new(InMemoryStorage::new()))
    }

    #[tokio::test]
    async fn should_create_pending_and_resolve_by_task_id() {
        let ledger = ledger();
        let item = ledger.create(new_item("c1", "100", "t-1")).await.unwrap();
        assert_eq!(item.status, EligibilityStatus::Pending);

        let by_task = ledger.get_by_task("t-1").await.unwrap().unwrap();
        assert_eq!(by_task.id, item.id);
        let resolved = ledger.resolve("t-1").await.unwrap().unwrap();
        assert_eq!(resolved.id, item.id);
    }

    #[tokio::test]
    async fn should_signal_not_found_for_unknown_ids() {
        let ledger = ledger();
        let err = ledger
            .update("nope", HistoryUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::NotFound { .. }));
    }

    #[tokio::test]
    async fn should_apply_idempotent_updates() {
        let ledger = ledger();
        let item = ledger.create(new_item("c1", "100", "t-1")).await.unwrap();

        let update = HistoryUpdate {
            status: Some(EligibilityStatus::Processing),
            interim_results: Some(InterimResults {
                screenshot: Some("https://shots.example/1.png".to_string()),
                documents: vec![],
            }),
            polling_attempts: Some(2),
            ..Default::default()
        };
        let first = ledger.update(&item.id, update.clone()).await.unwrap();
        let second = ledger.update(&item.id, update).await.unwrap();
        assert_eq!(first.status, second.status);
        assert_eq!(first.result, second.result);
        assert_eq!(first.interim_results, second.interim_results);
        assert_eq!(second.polling_attempts, 2);

        // Index memberships are unchanged by the repeat.
        let listed = ledger.list_for_clinic("c1").await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn should_stamp_completed_at_on_terminal_transition() {
        let ledger = ledger();
        let item = ledger.create(new_item("c1", "100", "t-1")).await.unwrap();
        let updated = ledger
            .update(
                &item.id,
                HistoryUpdate {
                    status: Some(EligibilityStatus::Complete),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated.completed_at.is_some());
    }

    #[tokio::test]
    async fn should_leave_no_orphaned_index_entries_on_delete() {
        let ledger = ledger();
        let item = ledger.create(new_item("c1", "100", "t-1")).await.unwrap();
        ledger.delete(&item.id).await.unwrap();

        assert!(ledger.list_for_clinic("c1").await.unwrap().is_empty());
        assert!(ledger.get_by_task("t-1").await.unwrap().is_none());
        assert!(ledger
            .list_for_patient("c1", "100")
            .await
            .unwrap()
            .is_empty());
        assert!(ledger
            .list_for_appointment("c1", "appt-t-1")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn should_evict_only_the_single_oldest_beyond_cap() {
        let store = Arc::new(InMemoryStorage::new());
        let ledger = HistoryLedger::with_retention(store, 3, keys::HISTORY_ITEM_TTL_SECS);

        let mut ids = Vec::new();
        for i in 0..4 {
            // Distinct created_at values keep the eviction order stable.
            tokio::time::sleep(tokio::time::Duration::from_millis(5)).await;
            let item = ledger
                .create(new_item("c1", "100", &format!("t-{}", i)))
                .await
                .unwrap();
            ids.push(item.id);
        }

        let remaining = ledger.list_for_clinic("c1").await.unwrap();
        assert_eq!(remaining.len(), 3);
        assert!(!remaining.iter().any(|item| item.id == ids[0]));
        assert!(ledger.get(&ids[0]).await.unwrap().is_none());
        assert!(ledger.get_by_task("t-0").await.unwrap().is_none());
    }
}
