// lib/src/connectors/his.rs
// Client for the Aster/Lifetrenz HIS. Every call is JSON-over-POST against
// a fixed envelope; timeouts abort the in-flight request and surface as a
// distinct timeout error. Only the insurance-mapping fetch is retried —
// it is the one upstream call with observed transient failures.

use base64::Engine as _;
use log::{debug, warn};
use reqwest::multipart;
use serde_json::{json, Value};
use tokio::time::{timeout, Duration};

use models::context::PatientContext;
use models::errors::{BrokerError, BrokerResult};
use models::his::{
    HisEnvelope, InsuranceMapping, SaveEligibilityOrderRequest, SavePolicyRequest,
    UploadAttachmentRequest,
};
use models::tpa::TpaConfig;

use crate::config::{AppConfig, HisDefaults};
use crate::retry::retry_with_backoff;

const SEARCH_TIMEOUT_SECS: u64 = 10;
const DETAILS_TIMEOUT_SECS: u64 = 15;
const MAPPING_TIMEOUT_SECS: u64 = 5;
const WRITE_TIMEOUT_SECS: u64 = 30;
const UPLOAD_TIMEOUT_SECS: u64 = 55;

const MAPPING_RETRY_ATTEMPTS: u32 = 3;
const MAPPING_RETRY_DELAY_MS: u64 = 1000;

#[derive(Debug, Clone)]
pub struct HisClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    client_id: String,
    defaults: HisDefaults,
}

impl HisClient {
    pub fn new(config: &AppConfig) -> Self {
        HisClient {
            http: reqwest::Client::new(),
            base_url: config.his_base_url.trim_end_matches('/').to_string(),
            api_key: config.his_api_key.clone(),
            client_id: config.client_id.clone(),
            defaults: config.his_defaults,
        }
    }

    async fn post(&self, path: &str, payload: &Value, timeout_secs: u64) -> BrokerResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        debug!("HIS POST {}", url);

        let mut request = self
            .http
            .post(&url)
            .header("x-client-id", &self.client_id)
            .json(payload);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = timeout(Duration::from_secs(timeout_secs), request.send())
            .await
            .map_err(|_| {
                BrokerError::TimeoutError(format!("HIS call {} timed out after {}s", path, timeout_secs))
            })?
            .map_err(|e| BrokerError::NetworkError(format!("HIS call {} failed: {}", path, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BrokerError::NetworkError(format!("HIS body read failed: {}", e)))?;
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

    async fn post_envelope(
        &self,
        path: &str,
        payload: &Value,
        timeout_secs: u64,
    ) -> BrokerResult<HisEnvelope> {
        let raw = self.post(path, payload, timeout_secs).await?;
        serde_json::from_value(raw.clone()).map_err(|_| BrokerError::UpstreamError {
            status: 200,
            body: raw.to_string(),
        })
    }

    pub async fn patient_details(&self, patient_id: i64) -> BrokerResult<HisEnvelope> {
        self.post_envelope(
            "/patient/details",
            &json!({"patientId": patient_id, "siteId": self.defaults.site_id}),
            DETAILS_TIMEOUT_SECS,
        )
        .await
    }

    pub async fn search_by_mpi(&self, mpi: &str) -> BrokerResult<HisEnvelope> {
        self.post_envelope(
            "/patient/search",
            &json!({"mpi": mpi, "customerId": self.defaults.customer_id}),
            SEARCH_TIMEOUT_SECS,
        )
        .await
    }

    pub async fn search_by_phone(&self, phone: &str) -> BrokerResult<HisEnvelope> {
        self.post_envelope(
            "/patient/search",
            &json!({"phone": phone, "customerId": self.defaults.customer_id}),
            SEARCH_TIMEOUT_SECS,
        )
        .await
    }

    pub async fn search_appointments(&self, patient_id: i64) -> BrokerResult<HisEnvelope> {
        self.post_envelope(
            "/appointment/search",
            &json!({"patientId": patient_id, "siteId": self.defaults.site_id}),
            SEARCH_TIMEOUT_SECS,
        )
        .await
    }

    pub async fn insurance_details(&self, patient_id: i64) -> BrokerResult<HisEnvelope> {
        self.post_envelope(
            "/patient/insurance",
            &json!({"patientId": patient_id, "siteId": self.defaults.site_id}),
            DETAILS_TIMEOUT_SECS,
        )
        .await
    }

    /// Fetches the TPA-to-insurance mapping rows for a code, retrying with
    /// backoff.
    pub async fn fetch_insurance_mapping(&self, ins_code: &str) -> BrokerResult<Vec<InsuranceMapping>> {
        let payload = json!({"insCode": ins_code, "siteId": self.defaults.site_id});
        let envelope = retry_with_backoff(
            || self.post_envelope("/insurance/mapping", &payload, MAPPING_TIMEOUT_SECS),
            MAPPING_RETRY_ATTEMPTS,
            MAPPING_RETRY_DELAY_MS,
        )
        .await?;

        let mut mappings = Vec::with_capacity(envelope.body.data.len());
        for row in envelope.body.data {
            match serde_json::from_value::<InsuranceMapping>(row) {
                Ok(mapping) => mappings.push(mapping),
                Err(e) => warn!("Skipping malformed insurance mapping row: {}", e),
            }
        }
        Ok(mappings)
    }

    pub async fn save_eligibility_order(
        &self,
        request: &SaveEligibilityOrderRequest,
        context: Option<&PatientContext>,
        config: Option<&TpaConfig>,
    ) -> BrokerResult<HisEnvelope> {
        let payload = build_save_order_payload(request, context, config, &self.defaults)?;
        self.post_envelope("/order/eligibility", &payload, WRITE_TIMEOUT_SECS)
            .await
    }

    pub async fn save_policy(
        &self,
        request: &SavePolicyRequest,
        config: Option<&TpaConfig>,
    ) -> BrokerResult<HisEnvelope> {
        let payload = build_save_policy_payload(request, config, &self.defaults)?;
        self.post_envelope("/patient/policy", &payload, WRITE_TIMEOUT_SECS)
            .await
    }

    pub async fn upload_attachment(
        &self,
        request: &UploadAttachmentRequest,
        context: Option<&PatientContext>,
    ) -> BrokerResult<Value> {
        let patient_id = request
            .patient_id
            .ok_or_else(|| BrokerError::ValidationError("patient_id is required".to_string()))?;
        let appointment_id = request.appointment_id.ok_or_else(|| {
            BrokerError::ValidationError("appointment_id is required".to_string())
        })?;
        let encounter_id = request.encounter_id.or_else(|| {
            context
                .and_then(|c| c.encounter_id.as_deref())
                .and_then(|id| id.parse().ok())
        });
        let file_name = request
            .file_name
            .clone()
            .unwrap_or_else(|| "attachment.pdf".to_string());
        let content = request
            .content_base64
            .as_deref()
            .ok_or_else(|| BrokerError::ValidationError("content_base64 is required".to_string()))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(content)
            .map_err(|e| BrokerError::ValidationError(format!("invalid base64 content: {}", e)))?;

        let mut part = multipart::Part::bytes(bytes).file_name(file_name.clone());
        if let Some(mime) = &request.mime_type {
            part = part
                .mime_str(mime)
                .map_err(|e| BrokerError::ValidationError(format!("invalid mime type: {}", e)))?;
        }
        let form = multipart::Form::new()
            .text("patientId", patient_id.to_string())
            .text("appointmentId", appointment_id.to_string())
            .text(
                "encounterId",
                encounter_id.map(|id| id.to_string()).unwrap_or_default(),
            )
            .text("createdBy", self.defaults.created_by.to_string())
            .part("file", part);

        let url = format!("{}/document/upload", self.base_url);
        let mut builder = self.http.post(&url).header("x-client-id", &self.client_id);
        if let Some(key) = &self.api_key {
            builder = builder.header("x-api-key", key);
        }
        let response = timeout(
            Duration::from_secs(UPLOAD_TIMEOUT_SECS),
            builder.multipart(form).send(),
        )
        .await
        .map_err(|_| {
            BrokerError::TimeoutError(format!(
                "HIS upload timed out after {}s",
                UPLOAD_TIMEOUT_SECS
            ))
        })?
        .map_err(|e| BrokerError::NetworkError(format!("HIS upload failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BrokerError::NetworkError(format!("HIS body read failed: {}", e)))?;
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
}

/// The config's mapping id always wins over the patient-derived fallback.
pub fn resolve_insurance_mapping_id(
    config: Option<&TpaConfig>,
    fallback: Option<i64>,
) -> Option<i64> {
    config
        .and_then(|c| c.hospital_insurance_mapping_id)
        .or(fallback)
}

/// Builds the fixed-shape eligibility-order payload the HIS expects.
/// Encounter and physician ids come from the request when present, else
/// from the cached context.
pub fn build_save_order_payload(
    request: &SaveEligibilityOrderRequest,
    context: Option<&PatientContext>,
    config: Option<&TpaConfig>,
    defaults: &HisDefaults,
) -> BrokerResult<Value> {
    let patient_id = request
        .patient_id
        .ok_or_else(|| BrokerError::ValidationError("patient_id is required".to_string()))?;
    let appointment_id = request
        .appointment_id
        .ok_or_else(|| BrokerError::ValidationError("appointment_id is required".to_string()))?;

    let encounter_id = request.encounter_id.or_else(|| {
        context
            .and_then(|c| c.encounter_id.as_deref())
            .and_then(|id| id.parse().ok())
    });
    let physician_id = request.physician_id.or_else(|| {
        context
            .and_then(|c| c.physician_id.as_deref())
            .and_then(|id| id.parse().ok())
    });

    let mapping_id = resolve_insurance_mapping_id(config, None).ok_or_else(|| {
        BrokerError::BusinessRule(format!(
            "missing insurance mapping ID for TPA {:?}",
            request.tpa_code
        ))
    })?;

    Ok(json!({
        "patientId": patient_id,
        "appointmentId": appointment_id,
        "encounterId": encounter_id,
        "physicianId": physician_id,
        "insuranceMappingId": mapping_id,
        "orderDetails": request.details,
        "createdBy": defaults.created_by,
        "vendorId": defaults.vendor_id,
        "siteId": defaults.site_id,
        "customerId": defaults.customer_id,
    }))
}

/// Builds the save-policy payload. `insuranceMappingId` prefers the TPA
/// config over the request's patient-derived fallback.
pub fn build_save_policy_payload(
    request: &SavePolicyRequest,
    config: Option<&TpaConfig>,
    defaults: &HisDefaults,
) -> BrokerResult<Value> {
    let patient_id = request
        .patient_id
        .ok_or_else(|| BrokerError::ValidationError("patient_id is required".to_string()))?;
    let appointment_id = request
        .appointment_id
        .ok_or_else(|| BrokerError::ValidationError("appointment_id is required".to_string()))?;

    let mapping_id = resolve_insurance_mapping_id(config, request.insurance_mapping_id)
        .ok_or_else(|| {
            BrokerError::BusinessRule(format!(
                "missing insurance mapping ID for TPA {:?}",
                request.tpa_code
            ))
        })?;

    Ok(json!({
        "patientId": patient_id,
        "appointmentId": appointment_id,
        "insuranceMappingId": mapping_id,
        "insuranceId": config.and_then(|c| c.insurance_id),
        "insuranceType": config.and_then(|c| c.insurance_type.map(u8::from)),
        "policyNumber": request.policy_number,
        "networkName": request.network_name,
        "validFrom": request.valid_from,
        "validTo": request.valid_to,
        "createdBy": defaults.created_by,
        "vendorId": defaults.vendor_id,
        "siteId": defaults.site_id,
        "customerId": defaults.customer_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::tpa::InsuranceType;

    fn config_with_mapping(mapping_id: i64) -> TpaConfig {
        let mut config = TpaConfig::new("NAS");
        config.hospital_insurance_mapping_id = Some(mapping_id);
        config.insurance_id = Some(7);
        config.insurance_type = Some(InsuranceType::Tpa);
        config.insurance_name = Some("Acme Health".to_string());
        config
    }

    #[test]
    fn should_prefer_config_mapping_id_over_fallback() {
        let config = config_with_mapping(55);
        let request = SavePolicyRequest {
            patient_id: Some(100),
            appointment_id: Some(200),
            tpa_code: Some("NAS".to_string()),
            insurance_mapping_id: Some(99),
            ..Default::default()
        };
        let payload = build_save_policy_payload(&request, Some(&config), &HisDefaults::default())
            .unwrap();
        assert_eq!(payload["insuranceMappingId"], 55);
        assert_eq!(payload["patientId"], 100);
        assert_eq!(payload["appointmentId"], 200);
    }

    #[test]
    fn should_use_fallback_mapping_id_without_config() {
        let request = SavePolicyRequest {
            patient_id: Some(100),
            appointment_id: Some(200),
            insurance_mapping_id: Some(99),
            ..Default::default()
        };
        let payload =
            build_save_policy_payload(&request, None, &HisDefaults::default()).unwrap();
        assert_eq!(payload["insuranceMappingId"], 99);
    }

    #[test]
    fn should_fail_save_policy_without_any_mapping_id() {
        let request = SavePolicyRequest {
            patient_id: Some(100),
            appointment_id: Some(200),
            ..Default::default()
        };
        let err = build_save_policy_payload(&request, None, &HisDefaults::default()).unwrap_err();
        assert!(matches!(err, BrokerError::BusinessRule(_)));
    }

    #[test]
    fn should_resolve_order_ids_from_cached_context() {
        let context = PatientContext {
            patient_id: Some("100".to_string()),
            encounter_id: Some("700".to_string()),
            physician_id: Some("31".to_string()),
            ..Default::default()
        };
        let request = SaveEligibilityOrderRequest {
            patient_id: Some(100),
            appointment_id: Some(200),
            tpa_code: Some("NAS".to_string()),
            ..Default::default()
        };
        let payload = build_save_order_payload(
            &request,
            Some(&context),
            Some(&config_with_mapping(55)),
            &HisDefaults::default(),
        )
        .unwrap();
        assert_eq!(payload["encounterId"], 700);
        assert_eq!(payload["physicianId"], 31);
        assert_eq!(payload["createdBy"], 13295);
        assert_eq!(payload["vendorId"], 24);
    }

    #[test]
    fn should_require_patient_and_appointment_ids() {
        let request = SaveEligibilityOrderRequest::default();
        let err = build_save_order_payload(
            &request,
            None,
            Some(&config_with_mapping(55)),
            &HisDefaults::default(),
        )
        .unwrap_err();
        assert!(matches!(err, BrokerError::ValidationError(_)));
    }
}
