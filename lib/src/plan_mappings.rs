// lib/src/plan_mappings.rs
// Plan-to-network mapping store and the bulk-import reconciler. The
// single-default-per-network rule is maintained by read-modify-write with
// no cross-key atomicity; concurrent imports against the same network can
// race (see DESIGN.md).

use std::collections::HashSet;
use std::sync::Arc;
use log::{debug, warn};

use models::errors::{BrokerError, BrokerResult};
use models::plan_mapping::{ImportReport, PlanMappingImport, PlanNetworkMapping};

use crate::keys;
use crate::storage_engine::KvStore;

#[derive(Debug, Clone)]
pub struct PlanMappingStore {
    store: Arc<dyn KvStore>,
}

impl PlanMappingStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        PlanMappingStore { store }
    }

    pub async fn get(
        &self,
        clinic_id: &str,
        tpa_code: &str,
        mapping_id: &str,
    ) -> BrokerResult<Option<PlanNetworkMapping>> {
        let raw = self
            .store
            .get(&keys::plan_mapping(clinic_id, tpa_code, mapping_id))
            .await?;
        raw.map(|json| {
            serde_json::from_str(&json)
                .map_err(|e| BrokerError::DeserializationError(e.to_string()))
        })
        .transpose()
    }

    pub async fn list(
        &self,
        clinic_id: &str,
        tpa_code: &str,
    ) -> BrokerResult<Vec<PlanNetworkMapping>> {
        let ids = self
            .store
            .set_members(&keys::plan_mapping_index(clinic_id, tpa_code))
            .await?;
        let mut mappings = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get(clinic_id, tpa_code, &id).await? {
                Some(mapping) => mappings.push(mapping),
                None => warn!(
                    "Plan-mapping index for clinic {} tpa {} references missing id {}",
                    clinic_id, tpa_code, id
                ),
            }
        }
        mappings.sort_by(|a, b| {
            a.mantys_network_name
                .cmp(&b.mantys_network_name)
                .then_with(|| a.lt_plan_name.cmp(&b.lt_plan_name))
        });
        Ok(mappings)
    }

    pub async fn save(&self, clinic_id: &str, mapping: &PlanNetworkMapping) -> BrokerResult<()> {
        let json = serde_json::to_string(mapping)?;
        self.store
            .set(
                &keys::plan_mapping(clinic_id, &mapping.tpa_code, &mapping.id),
                &json,
            )
            .await?;
        self.store
            .set_add(
                &keys::plan_mapping_index(clinic_id, &mapping.tpa_code),
                &mapping.id,
            )
            .await?;
        Ok(())
    }

    pub async fn update(
        &self,
        clinic_id: &str,
        mapping: &PlanNetworkMapping,
    ) -> BrokerResult<PlanNetworkMapping> {
        let existing = self
            .get(clinic_id, &mapping.tpa_code, &mapping.id)
            .await?
            .ok_or_else(|| BrokerError::not_found("plan mapping", &mapping.id))?;
        let mut updated = mapping.clone();
        updated.created_at = existing.created_at;
        updated.updated_at = chrono::Utc::now();
        self.save(clinic_id, &updated).await?;
        Ok(updated)
    }

    pub async fn delete(
        &self,
        clinic_id: &str,
        tpa_code: &str,
        mapping_id: &str,
    ) -> BrokerResult<()> {
        self.store
            .delete(&keys::plan_mapping(clinic_id, tpa_code, mapping_id))
            .await?;
        self.store
            .set_remove(&keys::plan_mapping_index(clinic_id, tpa_code), mapping_id)
            .await?;
        Ok(())
    }

    /// Makes `mapping_id` the default for its network, demoting every other
    /// mapping of the same (clinic, TPA, network).
    pub async fn set_default(
        &self,
        clinic_id: &str,
        tpa_code: &str,
        mapping_id: &str,
    ) -> BrokerResult<PlanNetworkMapping> {
        let mut target = self
            .get(clinic_id, tpa_code, mapping_id)
            .await?
            .ok_or_else(|| BrokerError::not_found("plan mapping", mapping_id))?;

        for mut sibling in self.list(clinic_id, tpa_code).await? {
            if sibling.id != target.id
                && sibling.mantys_network_name == target.mantys_network_name
                && sibling.is_default
            {
                sibling.is_default = false;
                sibling.updated_at = chrono::Utc::now();
                self.save(clinic_id, &sibling).await?;
            }
        }

        target.is_default = true;
        target.updated_at = chrono::Utc::now();
        self.save(clinic_id, &target).await?;
        Ok(target)
    }

    /// Two-pass bulk import. The upstream mapping feed repeats defaults
    /// across imports, so both passes are needed:
    /// 1. drop records missing TPA code, plan id, or network name;
    /// 2. within the batch, keep only the first default per (TPA, network);
    /// 3. persist survivors;
    /// 4. demote previously-persisted defaults that conflict with a newly
    ///    imported default.
    pub async fn bulk_import(
        &self,
        clinic_id: &str,
        records: Vec<PlanMappingImport>,
    ) -> BrokerResult<ImportReport> {
        let mut report = ImportReport::default();
        let mut seen_defaults: HashSet<(String, String)> = HashSet::new();
        let mut accepted: Vec<PlanNetworkMapping> = Vec::new();

        for record in records {
            let (tpa_code, lt_plan_id, network) = match (
                record.tpa_code.as_deref(),
                record.lt_plan_id,
                record.mantys_network_name.as_deref(),
            ) {
                (Some(tpa), Some(plan), Some(network))
                    if !tpa.is_empty() && !network.is_empty() =>
                {
                    (tpa.to_string(), plan, network.to_string())
                }
                _ => {
                    report.errors += 1;
                    continue;
                }
            };

            let mut mapping = PlanNetworkMapping::new(
                &tpa_code,
                lt_plan_id,
                record.lt_plan_name.as_deref().unwrap_or(""),
                &network,
            );
            mapping.lt_plan_code = record.lt_plan_code.clone();
            mapping.is_default = record.is_default;

            if mapping.is_default {
                let group = (tpa_code.clone(), network.clone());
                if !seen_defaults.insert(group) {
                    // First default in the batch wins for this network.
                    mapping.is_default = false;
                    report.defaults_fixed += 1;
                }
            }
            accepted.push(mapping);
        }

        for mapping in &accepted {
            self.save(clinic_id, mapping).await?;
        }
        report.imported = accepted.len();

        // Cross-batch pass: an old persisted default conflicting with a new
        // one is demoted.
        for (tpa_code, network) in &seen_defaults {
            let new_default_ids: HashSet<&str> = accepted
                .iter()
                .filter(|m| {
                    m.is_default && &m.tpa_code == tpa_code && &m.mantys_network_name == network
                })
                .map(|m| m.id.as_str())
                .collect();
            if new_default_ids.is_empty() {
                continue;
            }
            for mut existing in self.list(clinic_id, tpa_code).await? {
                if existing.is_default
                    && &existing.mantys_network_name == network
                    && !new_default_ids.contains(existing.id.as_str())
                {
                    existing.is_default = false;
                    existing.updated_at = chrono::Utc::now();
                    self.save(clinic_id, &existing).await?;
                    report.defaults_fixed += 1;
                }
            }
        }

        debug!(
            "Bulk import for clinic {}: {} imported, {} errors, {} defaults fixed",
            clinic_id, report.imported, report.errors, report.defaults_fixed
        );
        Ok(report)
    }

    pub async fn export_json(
        &self,
        clinic_id: &str,
        tpa_code: &str,
    ) -> BrokerResult<Vec<PlanNetworkMapping>> {
        self.list(clinic_id, tpa_code).await
    }

    pub async fn export_csv(&self, clinic_id: &str, tpa_code: &str) -> BrokerResult<String> {
        let mappings = self.list(clinic_id, tpa_code).await?;
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record([
                "id",
                "tpa_code",
                "lt_plan_id",
                "lt_plan_name",
                "lt_plan_code",
                "mantys_network_name",
                "is_default",
            ])
            .map_err(|e| BrokerError::SerializationError(e.to_string()))?;
        for mapping in &mappings {
            writer
                .write_record([
                    mapping.id.clone(),
                    mapping.tpa_code.clone(),
                    mapping.lt_plan_id.to_string(),
                    mapping.lt_plan_name.clone(),
                    mapping.lt_plan_code.clone().unwrap_or_default(),
                    mapping.mantys_network_name.clone(),
                    mapping.is_default.to_string(),
                ])
                .map_err(|e| BrokerError::SerializationError(e.to_string()))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| BrokerError::SerializationError(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| BrokerError::SerializationError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::storage_engine::InMemoryStorage;

    fn store() -> PlanMappingStore {
        PlanMappingStore::new(Arc::new(InMemoryStorage::new()))
    }

    fn import(plan: i64, network: &str, is_default: bool) -> PlanMappingImport {
        PlanMappingImport {
            tpa_code: Some("NAS".to_string()),
            lt_plan_id: Some(plan),
            lt_plan_name: Some(format!("Plan {}", plan)),
            lt_plan_code: None,
            mantys_network_name: Some(network.to_string()),
            is_default,
        }
    }

    #[tokio::test]
    async fn should_drop_and_count_invalid_records() {
        let mappings = store();
        let batch = vec![
            import(1, "RN2", false),
            PlanMappingImport::default(),
            PlanMappingImport {
                mantys_network_name: Some("".to_string()),
                ..import(2, "RN2", false)
            },
        ];
        let report = mappings.bulk_import("c1", batch).await.unwrap();
        assert_eq!(report.imported, 1);
        assert_eq!(report.errors, 2);
    }

    #[tokio::test]
    async fn should_keep_only_first_default_within_batch() {
        let mappings = store();
        let batch = vec![
            import(1, "RN2", true),
            import(2, "RN2", true),
            import(3, "GN", true),
        ];
        let report = mappings.bulk_import("c1", batch).await.unwrap();
        assert_eq!(report.imported, 3);
        assert_eq!(report.defaults_fixed, 1);

        let stored = mappings.list("c1", "NAS").await.unwrap();
        let rn2_defaults: Vec<_> = stored
            .iter()
            .filter(|m| m.mantys_network_name == "RN2" && m.is_default)
            .collect();
        assert_eq!(rn2_defaults.len(), 1);
        assert_eq!(rn2_defaults[0].lt_plan_id, 1);
    }

    #[tokio::test]
    async fn should_demote_previously_persisted_conflicting_default() {
        let mappings = store();
        mappings
            .bulk_import("c1", vec![import(1, "RN2", true)])
            .await
            .unwrap();

        let report = mappings
            .bulk_import("c1", vec![import(2, "RN2", true)])
            .await
            .unwrap();
        assert_eq!(report.imported, 1);
        assert_eq!(report.defaults_fixed, 1);

        let stored = mappings.list("c1", "NAS").await.unwrap();
        let defaults: Vec<_> = stored.iter().filter(|m| m.is_default).collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].lt_plan_id, 2);
    }

    #[tokio::test]
    async fn should_demote_siblings_on_set_default() {
        let mappings = store();
        mappings
            .bulk_import("c1", vec![import(1, "RN2", true), import(2, "RN2", false)])
            .await
            .unwrap();
        let stored = mappings.list("c1", "NAS").await.unwrap();
        let target = stored.iter().find(|m| m.lt_plan_id == 2).unwrap();

        mappings.set_default("c1", "NAS", &target.id).await.unwrap();
        let stored = mappings.list("c1", "NAS").await.unwrap();
        let defaults: Vec<_> = stored.iter().filter(|m| m.is_default).collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].lt_plan_id, 2);
    }

    #[tokio::test]
    async fn should_export_csv_with_header_row() {
        let mappings = store();
        mappings
            .bulk_import("c1", vec![import(1, "RN2", true)])
            .await
            .unwrap();
        let csv = mappings.export_csv("c1", "NAS").await.unwrap();
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("id,tpa_code"));
        let row = lines.next().unwrap();
        assert!(row.contains("RN2"));
        assert!(row.ends_with("true"));
    }

    #[tokio::test]
    async fn should_remove_mapping_and_index_entry_on_delete() {
        let mappings = store();
        mappings
            .bulk_import("c1", vec![import(1, "RN2", false)])
            .await
            .unwrap();
        let stored = mappings.list("c1", "NAS").await.unwrap();
        mappings.delete("c1", "NAS", &stored[0].id).await.unwrap();
        assert!(mappings.list("c1", "NAS").await.unwrap().is_empty());
    }
}
