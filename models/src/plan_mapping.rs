// models/src/plan_mapping.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Links an internal (Lifetrenz) plan to a Mantys network name. Many-to-many
/// except that each (clinic, TPA, network) is meant to have a single default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanNetworkMapping {
    pub id: String,
    pub tpa_code: String,
    pub lt_plan_id: i64,
    pub lt_plan_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lt_plan_code: Option<String>,
    pub mantys_network_name: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl PlanNetworkMapping {
    pub fn new(tpa_code: &str, lt_plan_id: i64, lt_plan_name: &str, network: &str) -> Self {
        let now = Utc::now();
        PlanNetworkMapping {
            id: Uuid::new_v4().to_string(),
            tpa_code: tpa_code.to_string(),
            lt_plan_id,
            lt_plan_name: lt_plan_name.to_string(),
            lt_plan_code: None,
            mantys_network_name: network.to_string(),
            is_default: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One record of an incoming bulk import batch. Everything is optional on
/// the wire; minimal validation happens in the reconciler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanMappingImport {
    #[serde(default)]
    pub tpa_code: Option<String>,
    #[serde(default)]
    pub lt_plan_id: Option<i64>,
    #[serde(default)]
    pub lt_plan_name: Option<String>,
    #[serde(default)]
    pub lt_plan_code: Option<String>,
    #[serde(default)]
    pub mantys_network_name: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

/// Outcome of a bulk import: surviving records written, invalid records
/// dropped, duplicate defaults demoted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportReport {
    pub imported: usize,
    pub errors: usize,
    pub defaults_fixed: usize,
}
