// lib/src/clinic_collections.rs
// Per-clinic reference collections (doctors, networks, plans, payers,
// Mantys networks). Each collection is one JSON array under one key;
// these lists are small and edited rarely, from the config UI only.

use std::sync::Arc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use models::clinic::ClinicConfig;
use models::errors::{BrokerError, BrokerResult};

use crate::keys;
use crate::storage_engine::KvStore;

/// Which collection a request addresses; resolves to its storage key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    Doctors,
    Networks,
    Plans,
    Payers,
    MantysNetworks,
}

impl CollectionKind {
    pub fn from_path(segment: &str) -> Option<Self> {
        match segment {
            "doctors" => Some(CollectionKind::Doctors),
            "networks" => Some(CollectionKind::Networks),
            "plans" => Some(CollectionKind::Plans),
            "payers" => Some(CollectionKind::Payers),
            "mantys-networks" => Some(CollectionKind::MantysNetworks),
            _ => None,
        }
    }

    /// Doctors are clinic-wide; the rest are scoped per TPA.
    pub fn needs_tpa_code(&self) -> bool {
        !matches!(self, CollectionKind::Doctors)
    }

    fn key(&self, clinic_id: &str, tpa_code: &str) -> String {
        match self {
            CollectionKind::Doctors => keys::doctors(clinic_id),
            CollectionKind::Networks => keys::networks(clinic_id, tpa_code),
            CollectionKind::Plans => keys::plans(clinic_id, tpa_code),
            CollectionKind::Payers => keys::payers(clinic_id, tpa_code),
            CollectionKind::MantysNetworks => keys::mantys_networks(clinic_id, tpa_code),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClinicCollections {
    store: Arc<dyn KvStore>,
}

impl ClinicCollections {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        ClinicCollections { store }
    }

    async fn load(&self, key: &str) -> BrokerResult<Vec<Value>> {
        match self.store.get(key).await? {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| BrokerError::DeserializationError(e.to_string())),
            None => Ok(Vec::new()),
        }
    }

    async fn persist(&self, key: &str, items: &[Value]) -> BrokerResult<()> {
        let json = serde_json::to_string(items)?;
        self.store.set(key, &json).await
    }

    pub async fn list(
        &self,
        kind: CollectionKind,
        clinic_id: &str,
        tpa_code: &str,
    ) -> BrokerResult<Vec<Value>> {
        self.load(&kind.key(clinic_id, tpa_code)).await
    }

    /// Inserts the item, replacing any existing entry with the same `id`.
    pub async fn upsert_item(
        &self,
        kind: CollectionKind,
        clinic_id: &str,
        tpa_code: &str,
        item: Value,
    ) -> BrokerResult<Vec<Value>> {
        let id = item
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| BrokerError::ValidationError("item requires an id".to_string()))?
            .to_string();
        let key = kind.key(clinic_id, tpa_code);
        let mut items = self.load(&key).await?;
        items.retain(|existing| existing.get("id").and_then(|v| v.as_str()) != Some(id.as_str()));
        items.push(item);
        self.persist(&key, &items).await?;
        Ok(items)
    }

    pub async fn delete_item(
        &self,
        kind: CollectionKind,
        clinic_id: &str,
        tpa_code: &str,
        id: &str,
    ) -> BrokerResult<Vec<Value>> {
        let key = kind.key(clinic_id, tpa_code);
        let mut items = self.load(&key).await?;
        let before = items.len();
        items.retain(|existing| existing.get("id").and_then(|v| v.as_str()) != Some(id));
        if items.len() == before {
            return Err(BrokerError::not_found("collection item", id));
        }
        self.persist(&key, &items).await?;
        Ok(items)
    }

    /// Typed accessor used by flows that need a concrete entity list.
    pub async fn list_typed<T: DeserializeOwned>(
        &self,
        kind: CollectionKind,
        clinic_id: &str,
        tpa_code: &str,
    ) -> BrokerResult<Vec<T>> {
        let raw = self.list(kind, clinic_id, tpa_code).await?;
        raw.into_iter()
            .map(|v| {
                serde_json::from_value(v)
                    .map_err(|e| BrokerError::DeserializationError(e.to_string()))
            })
            .collect()
    }

    pub async fn get_clinic_config(&self, clinic_id: &str) -> BrokerResult<Option<ClinicConfig>> {
        let raw = self.store.get(&keys::clinic_config(clinic_id)).await?;
        raw.map(|json| {
            serde_json::from_str(&json)
                .map_err(|e| BrokerError::DeserializationError(e.to_string()))
        })
        .transpose()
    }

    pub async fn set_clinic_config<T: Serialize>(
        &self,
        clinic_id: &str,
        config: &T,
    ) -> BrokerResult<()> {
        let json = serde_json::to_string(config)?;
        self.store.set(&keys::clinic_config(clinic_id), &json).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::storage_engine::InMemoryStorage;

    fn collections() -> ClinicCollections {
        ClinicCollections::new(Arc::new(InMemoryStorage::new()))
    }

    #[tokio::test]
    async fn should_upsert_by_id_without_duplicates() {
        let c = collections();
        c.upsert_item(
            CollectionKind::Payers,
            "c1",
            "NAS",
            json!({"id": "p1", "name": "Acme"}),
        )
        .await
        .unwrap();
        let items = c
            .upsert_item(
                CollectionKind::Payers,
                "c1",
                "NAS",
                json!({"id": "p1", "name": "Acme Health"}),
            )
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["name"], "Acme Health");
    }

    #[tokio::test]
    async fn should_scope_collections_by_tpa() {
        let c = collections();
        c.upsert_item(
            CollectionKind::Networks,
            "c1",
            "NAS",
            json!({"id": "n1", "name": "RN2"}),
        )
        .await
        .unwrap();
        assert!(c
            .list(CollectionKind::Networks, "c1", "NEXTCARE")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn should_error_when_deleting_unknown_item() {
        let c = collections();
        let err = c
            .delete_item(CollectionKind::Doctors, "c1", "", "missing")
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::NotFound { .. }));
    }

    #[tokio::test]
    async fn should_deserialize_typed_entities() {
        use models::clinic::{Doctor, Payer};

        let c = collections();
        c.upsert_item(
            CollectionKind::Doctors,
            "c1",
            "",
            json!({"id": "d1", "name": "Dr. Sam Odeh", "his_physician_id": 31}),
        )
        .await
        .unwrap();
        let doctors: Vec<Doctor> = c
            .list_typed(CollectionKind::Doctors, "c1", "")
            .await
            .unwrap();
        assert_eq!(doctors[0].his_physician_id, Some(31));

        c.upsert_item(
            CollectionKind::Payers,
            "c1",
            "NAS",
            json!({"id": "p1", "name": "Acme"}),
        )
        .await
        .unwrap();
        let payers: Vec<Payer> = c.list_typed(CollectionKind::Payers, "c1", "NAS").await.unwrap();
        assert_eq!(payers[0].name, "Acme");
    }

    #[tokio::test]
    async fn should_round_trip_clinic_config_blob() {
        let c = collections();
        let config = ClinicConfig {
            clinic_id: "c1".to_string(),
            clinic_name: Some("Downtown Clinic".to_string()),
            site_id: Some(31),
            customer_id: Some(1),
        };
        c.set_clinic_config("c1", &config).await.unwrap();
        let loaded = c.get_clinic_config("c1").await.unwrap().unwrap();
        assert_eq!(loaded, config);
        assert!(c.get_clinic_config("c2").await.unwrap().is_none());
    }
}
