// lib/src/tpa_store.rs
// Per-clinic TPA configuration store. Enumeration goes through a per-clinic
// index set; the backing store has no list-keys-by-prefix guarantee.

use std::sync::Arc;
use log::{debug, warn};

use models::errors::{BrokerError, BrokerResult};
use models::tpa::{RepairReport, TpaConfig, TpaDiagnostics, ValidationReport};

use crate::keys;
use crate::storage_engine::KvStore;

/// The four fields an eligibility submission needs on top of the code.
const MAPPING_FIELDS: [&str; 4] = [
    "hospital_insurance_mapping_id",
    "insurance_id",
    "insurance_type",
    "insurance_name",
];

/// Validates a config record. Always requires an identifying code; with
/// `require_mapping` the four mapping fields become mandatory as well.
/// Missing `ins_payer` is never more than a warning. Only `errors` entries
/// block a write.
pub fn validate_tpa_config(config: &TpaConfig, require_mapping: bool) -> ValidationReport {
    let mut report = ValidationReport::default();

    if config.code().is_none() {
        report
            .errors
            .push("one of ins_code or tpa_id is required".to_string());
        report.missing_fields.push("ins_code".to_string());
        report.missing_fields.push("tpa_id".to_string());
    }

    let missing_mapping: Vec<&str> = [
        ("hospital_insurance_mapping_id", config.hospital_insurance_mapping_id.is_none()),
        ("insurance_id", config.insurance_id.is_none()),
        ("insurance_type", config.insurance_type.is_none()),
        ("insurance_name", config.insurance_name.is_none()),
    ]
    .iter()
    .filter(|(_, missing)| *missing)
    .map(|(name, _)| *name)
    .collect();

    for field in &missing_mapping {
        report.missing_fields.push(field.to_string());
    }
    if require_mapping && !missing_mapping.is_empty() {
        report.errors.push(format!(
            "mapping fields required for eligibility: {}",
            missing_mapping.join(", ")
        ));
    }

    if config.ins_payer.is_none() {
        report.missing_fields.push("ins_payer".to_string());
        report
            .warnings
            .push("ins_payer is not set; payer display will fall back to insurance_name".to_string());
    }

    report.is_valid = report.errors.is_empty();
    report
}

#[derive(Debug, Clone)]
pub struct TpaConfigStore {
    store: Arc<dyn KvStore>,
}

impl TpaConfigStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        TpaConfigStore { store }
    }

    pub async fn get(&self, clinic_id: &str, code: &str) -> BrokerResult<Option<TpaConfig>> {
        let raw = self.store.get(&keys::tpa_config(clinic_id, code)).await?;
        raw.map(|json| {
            serde_json::from_str(&json)
                .map_err(|e| BrokerError::DeserializationError(e.to_string()))
        })
        .transpose()
    }

    /// Validates (unless skipped) and writes the config, registering its
    /// code in the clinic index. Returns the report either way; the write
    /// only happens when no `errors` were produced.
    pub async fn upsert(
        &self,
        clinic_id: &str,
        config: &TpaConfig,
        require_mapping: bool,
        skip_validation: bool,
    ) -> BrokerResult<ValidationReport> {
        let report = if skip_validation {
            ValidationReport {
                is_valid: config.code().is_some(),
                ..Default::default()
            }
        } else {
            validate_tpa_config(config, require_mapping)
        };
        let code = match config.code() {
            Some(code) if report.is_valid => code.to_string(),
            _ => return Ok(report),
        };

        let mut stored = config.clone();
        stored.updated_at = chrono::Utc::now();
        if let Some(existing) = self.get(clinic_id, &code).await? {
            stored.created_at = existing.created_at;
        }

        let json = serde_json::to_string(&stored)?;
        self.store
            .set(&keys::tpa_config(clinic_id, &code), &json)
            .await?;
        self.store
            .set_add(&keys::tpa_index(clinic_id), &code)
            .await?;
        debug!("Upserted TPA config {} for clinic {}", code, clinic_id);
        Ok(report)
    }

    pub async fn delete(&self, clinic_id: &str, code: &str) -> BrokerResult<()> {
        self.store.delete(&keys::tpa_config(clinic_id, code)).await?;
        self.store
            .set_remove(&keys::tpa_index(clinic_id), code)
            .await?;
        Ok(())
    }

    pub async fn list_all(&self, clinic_id: &str) -> BrokerResult<Vec<TpaConfig>> {
        let codes = self.store.set_members(&keys::tpa_index(clinic_id)).await?;
        let mut configs = Vec::with_capacity(codes.len());
        for code in codes {
            match self.get(clinic_id, &code).await? {
                Some(config) => configs.push(config),
                None => warn!(
                    "TPA index for clinic {} references missing config {}",
                    clinic_id, code
                ),
            }
        }
        configs.sort_by(|a, b| a.code().cmp(&b.code()));
        Ok(configs)
    }

    /// Fills missing mapping fields from sibling configs that share an
    /// `insurance_id` or `insurance_name`.
    pub async fn repair(&self, clinic_id: &str) -> BrokerResult<RepairReport> {
        let configs = self.list_all(clinic_id).await?;
        let mut report = RepairReport {
            examined: configs.len(),
            ..Default::default()
        };

        for config in &configs {
            if config.eligibility_ready() {
                continue;
            }
            let donor = configs.iter().find(|other| {
                other.code() != config.code()
                    && other.eligibility_ready()
                    && ((other.insurance_id.is_some() && other.insurance_id == config.insurance_id)
                        || (other.insurance_name.is_some()
                            && other.insurance_name == config.insurance_name))
            });
            match donor {
                Some(donor) => {
                    let mut patched = config.clone();
                    patched.hospital_insurance_mapping_id = patched
                        .hospital_insurance_mapping_id
                        .or(donor.hospital_insurance_mapping_id);
                    patched.insurance_id = patched.insurance_id.or(donor.insurance_id);
                    patched.insurance_type = patched.insurance_type.or(donor.insurance_type);
                    patched.insurance_name = patched
                        .insurance_name
                        .clone()
                        .or_else(|| donor.insurance_name.clone());
                    patched.ins_payer =
                        patched.ins_payer.clone().or_else(|| donor.ins_payer.clone());
                    self.upsert(clinic_id, &patched, false, false).await?;
                    report.repaired += 1;
                }
                None => report.still_incomplete += 1,
            }
        }
        Ok(report)
    }

    /// Reports, per indexed code, which mapping fields are missing and
    /// whether the index entry has a backing record at all.
    pub async fn diagnose(&self, clinic_id: &str) -> BrokerResult<Vec<TpaDiagnostics>> {
        let codes = self.store.set_members(&keys::tpa_index(clinic_id)).await?;
        let mut findings = Vec::with_capacity(codes.len());
        for code in codes {
            match self.get(clinic_id, &code).await? {
                Some(config) => {
                    let report = validate_tpa_config(&config, true);
                    findings.push(TpaDiagnostics {
                        code,
                        eligibility_ready: config.eligibility_ready(),
                        missing_fields: report
                            .missing_fields
                            .into_iter()
                            .filter(|f| MAPPING_FIELDS.contains(&f.as_str()))
                            .collect(),
                        dangling: false,
                    });
                }
                None => findings.push(TpaDiagnostics {
                    code,
                    eligibility_ready: false,
                    missing_fields: MAPPING_FIELDS.iter().map(|f| f.to_string()).collect(),
                    dangling: true,
                }),
            }
        }
        findings.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::tpa::InsuranceType;

    use crate::storage_engine::InMemoryStorage;

    fn store() -> TpaConfigStore {
        TpaConfigStore::new(Arc::new(InMemoryStorage::new()))
    }

    fn ready_config(code: &str) -> TpaConfig {
        let mut config = TpaConfig::new(code);
        config.hospital_insurance_mapping_id = Some(55);
        config.insurance_id = Some(7);
        config.insurance_type = Some(InsuranceType::Tpa);
        config.insurance_name = Some("Acme Health".to_string());
        config
    }

    #[test]
    fn should_reject_config_missing_both_codes() {
        let config = TpaConfig {
            ins_code: None,
            ..TpaConfig::new("x")
        };
        let report = validate_tpa_config(&config, false);
        assert!(!report.is_valid);
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn should_warn_but_accept_missing_ins_payer() {
        let config = ready_config("TPA001");
        let report = validate_tpa_config(&config, true);
        assert!(report.is_valid);
        assert!(report.errors.is_empty());
        assert_eq!(report.warnings.len(), 1);
        assert!(report.missing_fields.contains(&"ins_payer".to_string()));
    }

    #[test]
    fn should_block_strict_validation_without_mapping_fields() {
        let config = TpaConfig::new("TPA001");
        let lenient = validate_tpa_config(&config, false);
        assert!(lenient.is_valid);
        let strict = validate_tpa_config(&config, true);
        assert!(!strict.is_valid);
    }

    #[tokio::test]
    async fn should_upsert_and_enumerate_via_index() {
        let tpa = store();
        tpa.upsert("c1", &ready_config("TPA001"), false, false)
            .await
            .unwrap();
        tpa.upsert("c1", &ready_config("TPA002"), false, false)
            .await
            .unwrap();
        let all = tpa.list_all("c1").await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].code(), Some("TPA001"));

        tpa.delete("c1", "TPA001").await.unwrap();
        let all = tpa.list_all("c1").await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(tpa.get("c1", "TPA001").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn should_not_write_when_validation_fails() {
        let tpa = store();
        let bad = TpaConfig {
            ins_code: None,
            ..TpaConfig::new("x")
        };
        let report = tpa.upsert("c1", &bad, false, false).await.unwrap();
        assert!(!report.is_valid);
        assert!(tpa.list_all("c1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_repair_from_sibling_with_same_insurance_name() {
        let tpa = store();
        tpa.upsert("c1", &ready_config("TPA001"), false, false)
            .await
            .unwrap();
        let mut broken = TpaConfig::new("TPA002");
        broken.insurance_name = Some("Acme Health".to_string());
        tpa.upsert("c1", &broken, false, false).await.unwrap();

        let report = tpa.repair("c1").await.unwrap();
        assert_eq!(report.repaired, 1);
        let fixed = tpa.get("c1", "TPA002").await.unwrap().unwrap();
        assert_eq!(fixed.hospital_insurance_mapping_id, Some(55));
        assert!(fixed.eligibility_ready());
    }

    #[tokio::test]
    async fn should_flag_incomplete_configs_in_diagnose() {
        let tpa = store();
        tpa.upsert("c1", &ready_config("TPA001"), false, false)
            .await
            .unwrap();
        tpa.upsert("c1", &TpaConfig::new("TPA002"), false, false)
            .await
            .unwrap();
        let findings = tpa.diagnose("c1").await.unwrap();
        assert_eq!(findings.len(), 2);
        assert!(findings[0].eligibility_ready);
        assert!(!findings[1].eligibility_ready);
        assert_eq!(findings[1].missing_fields.len(), 4);
    }
}
