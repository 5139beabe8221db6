// models/src/mantys.rs
// Typed envelopes for the Mantys eligibility-automation API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Response to a task-creation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MantysTaskResponse {
    pub task_id: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Raw status snapshot for an in-flight or finished task. The `status`
/// string is the automation service's own vocabulary; classification into
/// the four-state lifecycle happens in `lib::classify`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MantysTaskStatus {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub eligibility_result: Option<MantysEligibilityResult>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MantysEligibilityResult {
    /// Explicit error marker set by the automation service.
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub data_dump: Option<MantysDataDump>,
    /// Structured policy/network/copay data, passed through opaquely.
    #[serde(default)]
    pub policy_details: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MantysDataDump {
    /// Free-text message from the portal run; scanned for failure keywords.
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub screenshot_url: Option<String>,
    #[serde(default)]
    pub documents: Option<Vec<MantysDocument>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MantysDocument {
    pub name: String,
    pub url: String,
}

/// Request body for `POST /mantys/eligibility-check`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EligibilityCheckRequest {
    #[serde(default)]
    pub clinic_id: Option<String>,
    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub appointment_id: Option<String>,
    #[serde(default)]
    pub mpi: Option<String>,
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default)]
    pub emirates_id: Option<String>,
    #[serde(default)]
    pub tpa_code: Option<String>,
    #[serde(default)]
    pub insurance_name: Option<String>,
    #[serde(default)]
    pub network_name: Option<String>,
}
