// lib/src/connectors/mantys.rs
// Client for the Mantys eligibility-automation service. The API key is a
// secret with no source default; calls without one fail fast as a
// configuration error instead of reaching the wire.

use log::debug;
use serde_json::{json, Value};
use tokio::time::{timeout, Duration};

use models::errors::{BrokerError, BrokerResult};
use models::mantys::{EligibilityCheckRequest, MantysTaskResponse, MantysTaskStatus};

use crate::config::AppConfig;

const CREATE_TIMEOUT_SECS: u64 = 30;
const STATUS_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone)]
pub struct MantysClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl MantysClient {
    pub fn new(config: &AppConfig) -> Self {
        MantysClient {
            http: reqwest::Client::new(),
            base_url: config.mantys_base_url.trim_end_matches('/').to_string(),
            api_key: config.mantys_api_key.clone(),
        }
    }

    fn api_key(&self) -> BrokerResult<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| BrokerError::ConfigurationError("MANTYS_API_KEY is not set".to_string()))
    }

    async fn post(&self, path: &str, payload: &Value, timeout_secs: u64) -> BrokerResult<Value> {
        let key = self.api_key()?;
        let url = format!("{}{}", self.base_url, path);
        debug!("Mantys POST {}", url);

        let response = timeout(
            Duration::from_secs(timeout_secs),
            self.http
                .post(&url)
                .header("x-api-key", key)
                .json(payload)
                .send(),
        )
        .await
        .map_err(|_| {
            BrokerError::TimeoutError(format!(
                "Mantys call {} timed out after {}s",
                path, timeout_secs
            ))
        })?
        .map_err(|e| BrokerError::NetworkError(format!("Mantys call {} failed: {}", path, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BrokerError::NetworkError(format!("Mantys body read failed: {}", e)))?;
        if !status.is_success() {
            return Err(BrokerError::UpstreamError {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|_| BrokerError::UpstreamError {
            status: status.as_u16(),
            body,
        })
    }

    /// Launches an eligibility check; the returned task id is the external
    /// correlation key for all later status polls.
    pub async fn create_task(
        &self,
        request: &EligibilityCheckRequest,
    ) -> BrokerResult<MantysTaskResponse> {
        let payload = json!({
            "clinic_id": request.clinic_id,
            "patient": {
                "patient_id": request.patient_id,
                "mpi": request.mpi,
                "name": request.patient_name,
                "emirates_id": request.emirates_id,
            },
            "appointment_id": request.appointment_id,
            "tpa_code": request.tpa_code,
            "insurance_name": request.insurance_name,
            "network_name": request.network_name,
        });
        let raw = self
            .post("/eligibility/tasks", &payload, CREATE_TIMEOUT_SECS)
            .await?;
        serde_json::from_value(raw.clone()).map_err(|_| BrokerError::UpstreamError {
            status: 200,
            body: raw.to_string(),
        })
    }

    /// Polls one task. The raw status string is classified by the caller.
    pub async fn check_status(&self, task_id: &str) -> BrokerResult<MantysTaskStatus> {
        let raw = self
            .post(
                "/eligibility/status",
                &json!({"task_id": task_id}),
                STATUS_TIMEOUT_SECS,
            )
            .await?;
        serde_json::from_value(raw.clone()).map_err(|_| BrokerError::UpstreamError {
            status: 200,
            body: raw.to_string(),
        })
    }
}
