// models/src/tpa.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// HIS-side classification of a payer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum InsuranceType {
    Insurance,
    Tpa,
}

impl TryFrom<u8> for InsuranceType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(InsuranceType::Insurance),
            2 => Ok(InsuranceType::Tpa),
            other => Err(format!("invalid insurance_type: {}", other)),
        }
    }
}

impl From<InsuranceType> for u8 {
    fn from(value: InsuranceType) -> u8 {
        match value {
            InsuranceType::Insurance => 1,
            InsuranceType::Tpa => 2,
        }
    }
}

/// Per-clinic TPA configuration record. `ins_code` is the primary key
/// component; legacy rows may carry only `tpa_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TpaConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ins_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tpa_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hospital_insurance_mapping_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insurance_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insurance_type: Option<InsuranceType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insurance_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ins_payer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<i64>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl TpaConfig {
    pub fn new(ins_code: &str) -> Self {
        let now = Utc::now();
        TpaConfig {
            ins_code: Some(ins_code.to_string()),
            tpa_id: None,
            hospital_insurance_mapping_id: None,
            insurance_id: None,
            insurance_type: None,
            insurance_name: None,
            ins_payer: None,
            site_id: None,
            customer_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Identifying code used as the storage key: `ins_code`, falling back
    /// to the legacy `tpa_id`.
    pub fn code(&self) -> Option<&str> {
        self.ins_code.as_deref().or(self.tpa_id.as_deref())
    }

    /// True when every field required to submit an eligibility order to
    /// the HIS is present.
    pub fn eligibility_ready(&self) -> bool {
        self.hospital_insurance_mapping_id.is_some()
            && self.insurance_id.is_some()
            && self.insurance_type.is_some()
            && self.insurance_name.is_some()
    }
}

/// Outcome of a validation pass. Only `errors` blocks a write; `warnings`
/// and `missing_fields` are advisory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub missing_fields: Vec<String>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

/// Per-config finding from a diagnostic sweep over a clinic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TpaDiagnostics {
    pub code: String,
    pub eligibility_ready: bool,
    pub missing_fields: Vec<String>,
    /// Index set member with no backing record.
    pub dangling: bool,
}

/// Summary of a repair pass over a clinic's configs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepairReport {
    pub examined: usize,
    pub repaired: usize,
    pub still_incomplete: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_round_trip_insurance_type_as_integer() {
        let json = serde_json::to_string(&InsuranceType::Tpa).unwrap();
        assert_eq!(json, "2");
        let back: InsuranceType = serde_json::from_str("1").unwrap();
        assert_eq!(back, InsuranceType::Insurance);
    }

    #[test]
    fn should_reject_unknown_insurance_type() {
        let parsed: Result<InsuranceType, _> = serde_json::from_str("3");
        assert!(parsed.is_err());
    }

    #[test]
    fn should_fall_back_to_legacy_tpa_id_for_code() {
        let mut config = TpaConfig::new("TPA001");
        assert_eq!(config.code(), Some("TPA001"));
        config.ins_code = None;
        config.tpa_id = Some("legacy-9".to_string());
        assert_eq!(config.code(), Some("legacy-9"));
    }

    #[test]
    fn should_require_all_four_mapping_fields_for_eligibility() {
        let mut config = TpaConfig::new("TPA001");
        assert!(!config.eligibility_ready());
        config.hospital_insurance_mapping_id = Some(55);
        config.insurance_id = Some(7);
        config.insurance_type = Some(InsuranceType::Insurance);
        assert!(!config.eligibility_ready());
        config.insurance_name = Some("Acme Health".to_string());
        assert!(config.eligibility_ready());
    }
}
