// models/src/his.rs
// Typed envelopes for the Aster/Lifetrenz HIS wire format. Conversion from
// the loose upstream JSON happens at the connector boundary; nothing past
// it passes untyped maps around.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tpa::InsuranceType;

/// Every HIS response wraps its payload in this fixed envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HisEnvelope {
    pub head: HisHead,
    pub body: HisBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HisHead {
    #[serde(rename = "StatusValue")]
    pub status_value: i32,
    #[serde(rename = "StatusText")]
    pub status_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HisBody {
    #[serde(rename = "Data", default)]
    pub data: Vec<Value>,
    #[serde(rename = "RecordCount", default)]
    pub record_count: i64,
    #[serde(rename = "TotalRecords", default)]
    pub total_records: i64,
}

impl HisEnvelope {
    /// HIS signals success inside the envelope, independent of HTTP status.
    pub fn is_success(&self) -> bool {
        self.head.status_value == 1
    }
}

/// TPA-to-insurance mapping row as returned by the HIS lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsuranceMapping {
    pub ins_code: String,
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
}

/// Request body for `POST /aster/save-eligibility-order`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SaveEligibilityOrderRequest {
    #[serde(default)]
    pub patient_id: Option<i64>,
    #[serde(default)]
    pub appointment_id: Option<i64>,
    #[serde(default)]
    pub encounter_id: Option<i64>,
    #[serde(default)]
    pub physician_id: Option<i64>,
    #[serde(default)]
    pub tpa_code: Option<String>,
    /// Opaque eligibility result forwarded with the order.
    #[serde(default)]
    pub details: Option<Value>,
}

/// Request body for `POST /aster/save-policy`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SavePolicyRequest {
    #[serde(default)]
    pub patient_id: Option<i64>,
    #[serde(default)]
    pub appointment_id: Option<i64>,
    #[serde(default)]
    pub tpa_code: Option<String>,
    #[serde(default)]
    pub policy_number: Option<String>,
    #[serde(default)]
    pub network_name: Option<String>,
    /// Patient-derived fallback; the TPA config value wins when present.
    #[serde(default)]
    pub insurance_mapping_id: Option<i64>,
    #[serde(default)]
    pub valid_from: Option<String>,
    #[serde(default)]
    pub valid_to: Option<String>,
}

/// Request body for `POST /aster/upload-attachment`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadAttachmentRequest {
    #[serde(default)]
    pub patient_id: Option<i64>,
    #[serde(default)]
    pub appointment_id: Option<i64>,
    #[serde(default)]
    pub encounter_id: Option<i64>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    /// File content, base64-encoded by the UI.
    #[serde(default)]
    pub content_base64: Option<String>,
}
