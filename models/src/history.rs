// models/src/history.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle of a single eligibility check.
///
/// pending -> processing -> complete | error. Terminal states never
/// transition further; re-polls reset the record to pending explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EligibilityStatus {
    Pending,
    Processing,
    Complete,
    Error,
}

impl Default for EligibilityStatus {
    fn default() -> Self {
        EligibilityStatus::Pending
    }
}

impl EligibilityStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EligibilityStatus::Complete | EligibilityStatus::Error)
    }
}

/// Screenshot and document links observed while a check is still running.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterimResults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub documents: Vec<InterimDocument>,
}

impl InterimResults {
    pub fn is_empty(&self) -> bool {
        self.screenshot.is_none() && self.documents.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterimDocument {
    pub name: String,
    pub url: String,
}

/// One eligibility-check attempt, tracked from launch to terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibilityHistoryItem {
    pub id: String,
    pub clinic_id: String,
    pub patient_id: String,
    /// External correlation key issued by the automation service.
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appointment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mpi: Option<String>,
    #[serde(default)]
    pub status: EligibilityStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interim_results: Option<InterimResults>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub polling_attempts: u32,
}

/// Partial update applied to a history item. Unset fields are left as-is,
/// which is what makes repeated identical updates idempotent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryUpdate {
    #[serde(default)]
    pub status: Option<EligibilityStatus>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub interim_results: Option<InterimResults>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub polling_attempts: Option<u32>,
}

/// Ephemeral record used by the polling loop; the whole list lives under a
/// single short-TTL key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingTask {
    pub task_id: String,
    pub history_id: String,
    #[serde(default)]
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_serialize_status_lowercase() {
        assert_eq!(
            serde_json::to_string(&EligibilityStatus::Processing).unwrap(),
            "\"processing\""
        );
        let back: EligibilityStatus = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(back, EligibilityStatus::Error);
    }

    #[test]
    fn should_mark_only_complete_and_error_terminal() {
        assert!(!EligibilityStatus::Pending.is_terminal());
        assert!(!EligibilityStatus::Processing.is_terminal());
        assert!(EligibilityStatus::Complete.is_terminal());
        assert!(EligibilityStatus::Error.is_terminal());
    }

    #[test]
    fn should_treat_blank_interim_results_as_empty() {
        assert!(InterimResults::default().is_empty());
        let with_screenshot = InterimResults {
            screenshot: Some("https://shots.example/1.png".to_string()),
            documents: vec![],
        };
        assert!(!with_screenshot.is_empty());
    }
}
