// lib/src/context_cache.rs
// TTL'd patient-context snapshots, written redundantly under every
// identifier the record carries so later wizard steps can look it up by
// whichever id they have.

use std::sync::Arc;
use log::debug;

use models::context::PatientContext;
use models::errors::{BrokerError, BrokerResult};

use crate::keys;
use crate::storage_engine::KvStore;

#[derive(Debug, Clone)]
pub struct ContextCache {
    store: Arc<dyn KvStore>,
    ttl_secs: u64,
}

impl ContextCache {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        ContextCache {
            store,
            ttl_secs: keys::CONTEXT_TTL_SECS,
        }
    }

    pub fn with_ttl(store: Arc<dyn KvStore>, ttl_secs: u64) -> Self {
        ContextCache { store, ttl_secs }
    }

    /// Wholesale overwrite under every key the snapshot carries.
    pub async fn store(&self, context: &PatientContext) -> BrokerResult<()> {
        if !context.has_any_key() {
            return Err(BrokerError::ValidationError(
                "context requires one of mpi, patient_id, appointment_id".to_string(),
            ));
        }
        let json = serde_json::to_string(context)?;
        if let Some(mpi) = &context.mpi {
            self.store
                .set_with_ttl(&keys::context_by_mpi(mpi), &json, self.ttl_secs)
                .await?;
        }
        if let Some(patient_id) = &context.patient_id {
            self.store
                .set_with_ttl(&keys::context_by_patient(patient_id), &json, self.ttl_secs)
                .await?;
        }
        if let Some(appointment_id) = &context.appointment_id {
            self.store
                .set_with_ttl(
                    &keys::context_by_appointment(appointment_id),
                    &json,
                    self.ttl_secs,
                )
                .await?;
        }
        debug!(
            "Stored patient context (mpi={:?}, patient={:?}, appointment={:?})",
            context.mpi, context.patient_id, context.appointment_id
        );
        Ok(())
    }

    /// Partial update: merges onto whatever snapshot any of the incoming
    /// identifiers resolves to, then rewrites all keys.
    pub async fn update(&self, incoming: &PatientContext) -> BrokerResult<PatientContext> {
        let existing = self.find(incoming).await?.unwrap_or_default();
        let merged = existing.merged_with(incoming);
        self.store(&merged).await?;
        Ok(merged)
    }

    pub async fn get_by_mpi(&self, mpi: &str) -> BrokerResult<Option<PatientContext>> {
        self.fetch(&keys::context_by_mpi(mpi)).await
    }

    pub async fn get_by_patient(&self, patient_id: &str) -> BrokerResult<Option<PatientContext>> {
        self.fetch(&keys::context_by_patient(patient_id)).await
    }

    pub async fn get_by_appointment(
        &self,
        appointment_id: &str,
    ) -> BrokerResult<Option<PatientContext>> {
        self.fetch(&keys::context_by_appointment(appointment_id))
            .await
    }

    /// First hit across the identifiers present on `probe`.
    pub async fn find(&self, probe: &PatientContext) -> BrokerResult<Option<PatientContext>> {
        if let Some(mpi) = &probe.mpi {
            if let Some(found) = self.get_by_mpi(mpi).await? {
                return Ok(Some(found));
            }
        }
        if let Some(patient_id) = &probe.patient_id {
            if let Some(found) = self.get_by_patient(patient_id).await? {
                return Ok(Some(found));
            }
        }
        if let Some(appointment_id) = &probe.appointment_id {
            if let Some(found) = self.get_by_appointment(appointment_id).await? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    async fn fetch(&self, key: &str) -> BrokerResult<Option<PatientContext>> {
        let raw = self.store.get(key).await?;
        raw.map(|json| {
            serde_json::from_str(&json)
                .map_err(|e| BrokerError::DeserializationError(e.to_string()))
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::storage_engine::InMemoryStorage;

    fn cache() -> ContextCache {
        ContextCache::new(Arc::new(InMemoryStorage::new()))
    }

    fn full_context() -> PatientContext {
        PatientContext {
            mpi: Some("MPI-1".to_string()),
            patient_id: Some("100".to_string()),
            appointment_id: Some("200".to_string()),
            encounter_id: Some("E-7".to_string()),
            physician_id: Some("D-3".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn should_round_trip_by_every_identifier() {
        let cache = cache();
        cache.store(&full_context()).await.unwrap();

        let by_mpi = cache.get_by_mpi("MPI-1").await.unwrap().unwrap();
        let by_patient = cache.get_by_patient("100").await.unwrap().unwrap();
        let by_appointment = cache.get_by_appointment("200").await.unwrap().unwrap();

        for found in [&by_mpi, &by_patient, &by_appointment] {
            assert_eq!(found.mpi.as_deref(), Some("MPI-1"));
            assert_eq!(found.patient_id.as_deref(), Some("100"));
            assert_eq!(found.appointment_id.as_deref(), Some("200"));
        }
    }

    #[tokio::test]
    async fn should_reject_context_with_no_identifiers() {
        let cache = cache();
        let err = cache.store(&PatientContext::default()).await.unwrap_err();
        assert!(matches!(err, BrokerError::ValidationError(_)));
    }

    #[tokio::test]
    async fn should_copy_forward_fields_on_partial_update() {
        let cache = cache();
        cache.store(&full_context()).await.unwrap();

        let partial = PatientContext {
            patient_id: Some("100".to_string()),
            physician_id: Some("D-9".to_string()),
            ..Default::default()
        };
        let merged = cache.update(&partial).await.unwrap();
        assert_eq!(merged.physician_id.as_deref(), Some("D-9"));
        assert_eq!(merged.encounter_id.as_deref(), Some("E-7"));

        // The merged snapshot is visible under the other keys too.
        let by_mpi = cache.get_by_mpi("MPI-1").await.unwrap().unwrap();
        assert_eq!(by_mpi.physician_id.as_deref(), Some("D-9"));
    }

    #[tokio::test(start_paused = true)]
    async fn should_expire_snapshots_after_ttl() {
        let cache = ContextCache::with_ttl(Arc::new(InMemoryStorage::new()), 60);
        cache.store(&full_context()).await.unwrap();
        tokio::time::advance(tokio::time::Duration::from_secs(61)).await;
        assert!(cache.get_by_mpi("MPI-1").await.unwrap().is_none());
    }
}
