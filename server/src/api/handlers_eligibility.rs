// server/src/api/handlers_eligibility.rs
// Eligibility-check launch, status polling, and history ledger endpoints.

use chrono::Utc;
use log::warn;
use serde::Deserialize;
use serde_json::json;
use warp::http::StatusCode;

use lib::classify::classify_task_status;
use lib::history::ledger::NewHistoryItem;
use models::errors::BrokerError;
use models::history::{
    EligibilityStatus, HistoryUpdate, InterimDocument, InterimResults, PollingTask,
};
use models::mantys::{EligibilityCheckRequest, MantysTaskStatus};

use super::replies::{error_reply, missing_fields, ok_json, status_json, ApiReply};
use super::AppState;

#[derive(Debug, Deserialize)]
pub struct TaskIdRequest {
    #[serde(default)]
    pub task_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub clinic_id: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub appointment_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryCreateRequest {
    #[serde(default)]
    pub clinic_id: Option<String>,
    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub appointment_id: Option<String>,
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default)]
    pub mpi: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryPutRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(flatten)]
    pub update: HistoryUpdate,
}

#[derive(Debug, Deserialize)]
pub struct HistoryDeleteQuery {
    #[serde(default)]
    pub id: Option<String>,
}

/// Lifts the screenshot/document links out of a raw status snapshot.
fn interim_results_of(raw: &MantysTaskStatus) -> Option<InterimResults> {
    let dump = raw.eligibility_result.as_ref()?.data_dump.as_ref()?;
    let documents: Vec<InterimDocument> = dump
        .documents
        .iter()
        .flatten()
        .map(|d| InterimDocument {
            name: d.name.clone(),
            url: d.url.clone(),
        })
        .collect();
    if dump.screenshot_url.is_none() && documents.is_empty() {
        return None;
    }
    Some(InterimResults {
        screenshot: dump.screenshot_url.clone(),
        documents,
    })
}

fn error_message_of(raw: &MantysTaskStatus) -> String {
    raw.eligibility_result
        .as_ref()
        .and_then(|r| r.error.clone())
        .or_else(|| {
            raw.eligibility_result
                .as_ref()
                .and_then(|r| r.data_dump.as_ref())
                .and_then(|d| d.message.clone())
        })
        .unwrap_or_else(|| "eligibility check failed".to_string())
}

/// Builds the ledger update for one observed upstream snapshot.
fn update_for(raw: &MantysTaskStatus, attempts: Option<u32>) -> (EligibilityStatus, HistoryUpdate) {
    let status = classify_task_status(raw);
    let mut update = HistoryUpdate {
        status: Some(status),
        interim_results: interim_results_of(raw),
        polling_attempts: attempts,
        ..Default::default()
    };
    match status {
        EligibilityStatus::Complete => {
            update.completed_at = Some(Utc::now());
            update.result = raw
                .eligibility_result
                .as_ref()
                .and_then(|r| serde_json::to_value(r).ok());
        }
        EligibilityStatus::Error => {
            update.completed_at = Some(Utc::now());
            update.error = Some(error_message_of(raw));
        }
        _ => {}
    }
    (status, update)
}

/// POST /mantys/eligibility-check — launches the external task, records a
/// pending history item, and registers the polling task. 202 on success.
pub async fn eligibility_check(body: EligibilityCheckRequest, state: AppState) -> ApiReply {
    let Some(clinic_id) = state.clinic_id(body.clinic_id.as_deref()) else {
        return Ok(missing_fields(&["clinic_id"]));
    };
    let Some(patient_id) = body.patient_id.clone().filter(|v| !v.is_empty()) else {
        return Ok(missing_fields(&["patient_id"]));
    };
    if body.tpa_code.as_deref().unwrap_or("").is_empty() {
        return Ok(missing_fields(&["tpa_code"]));
    }

    let task = match state.mantys.create_task(&body).await {
        Ok(task) => task,
        Err(e) => return Ok(error_reply(&e)),
    };

    let item = match state
        .ledger
        .create(NewHistoryItem {
            clinic_id,
            patient_id,
            task_id: task.task_id.clone(),
            appointment_id: body.appointment_id.clone(),
            patient_name: body.patient_name.clone(),
            mpi: body.mpi.clone(),
        })
        .await
    {
        Ok(item) => item,
        Err(e) => return Ok(error_reply(&e)),
    };

    if let Err(e) = state
        .polling
        .upsert(PollingTask {
            task_id: task.task_id.clone(),
            history_id: item.id.clone(),
            attempts: 0,
            started_at: Utc::now(),
        })
        .await
    {
        // Polling bookkeeping is best-effort; the check itself is launched.
        warn!("Failed to register polling task {}: {}", task.task_id, e);
    }

    Ok(status_json(
        &json!({
            "task_id": task.task_id,
            "status": "pending",
            "history_id": item.id,
        }),
        StatusCode::ACCEPTED,
    ))
}

/// POST /mantys/check-status — polls the external task once, classifies
/// the snapshot, and folds it into the ledger.
pub async fn check_status(body: TaskIdRequest, state: AppState) -> ApiReply {
    let Some(task_id) = body.task_id.filter(|v| !v.is_empty()) else {
        return Ok(missing_fields(&["task_id"]));
    };

    let raw = match state.mantys.check_status(&task_id).await {
        Ok(raw) => raw,
        Err(e) => return Ok(error_reply(&e)),
    };

    let attempts = match state.polling.bump_attempts(&task_id).await {
        Ok(attempts) => attempts,
        Err(e) => {
            warn!("Polling bookkeeping failed for {}: {}", task_id, e);
            None
        }
    };

    let (status, update) = update_for(&raw, attempts);
    // An unknown task id is a not-found signal, never an implicit create.
    let item = match state.ledger.update(&task_id, update).await {
        Ok(item) => item,
        Err(e) => return Ok(error_reply(&e)),
    };

    if status.is_terminal() {
        if let Err(e) = state.polling.remove(&task_id).await {
            warn!("Failed to drop polling task {}: {}", task_id, e);
        }
    }

    Ok(ok_json(&json!({
        "task_id": task_id,
        "status": status,
        "history": item,
    })))
}

/// GET /eligibility-history — by id, task, patient, appointment, or whole
/// clinic, in that precedence order.
pub async fn history_get(query: HistoryQuery, state: AppState) -> ApiReply {
    if let Some(id) = query.id.as_deref() {
        return match state.ledger.get(id).await {
            Ok(Some(item)) => Ok(ok_json(&item)),
            Ok(None) => Ok(error_reply(&BrokerError::not_found("history item", id))),
            Err(e) => Ok(error_reply(&e)),
        };
    }
    if let Some(task_id) = query.task_id.as_deref() {
        return match state.ledger.get_by_task(task_id).await {
            Ok(Some(item)) => Ok(ok_json(&item)),
            Ok(None) => Ok(error_reply(&BrokerError::not_found("history item", task_id))),
            Err(e) => Ok(error_reply(&e)),
        };
    }

    let Some(clinic_id) = state.clinic_id(query.clinic_id.as_deref()) else {
        return Ok(missing_fields(&["clinic_id"]));
    };
    let result = if let Some(patient_id) = query.patient_id.as_deref() {
        state.ledger.list_for_patient(&clinic_id, patient_id).await
    } else if let Some(appointment_id) = query.appointment_id.as_deref() {
        state
            .ledger
            .list_for_appointment(&clinic_id, appointment_id)
            .await
    } else {
        state.ledger.list_for_clinic(&clinic_id).await
    };
    match result {
        Ok(items) => Ok(ok_json(&items)),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// POST /eligibility-history — manual record creation (used by the UI when
/// a check is launched outside the normal flow).
pub async fn history_create(body: HistoryCreateRequest, state: AppState) -> ApiReply {
    let Some(clinic_id) = state.clinic_id(body.clinic_id.as_deref()) else {
        return Ok(missing_fields(&["clinic_id"]));
    };
    let (Some(patient_id), Some(task_id)) = (body.patient_id, body.task_id) else {
        return Ok(missing_fields(&["patient_id", "task_id"]));
    };
    match state
        .ledger
        .create(NewHistoryItem {
            clinic_id,
            patient_id,
            task_id,
            appointment_id: body.appointment_id,
            patient_name: body.patient_name,
            mpi: body.mpi,
        })
        .await
    {
        Ok(item) => Ok(status_json(&item, StatusCode::CREATED)),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// PUT /eligibility-history — partial update by id or task id. Resetting a
/// record to pending with no interim results triggers an implicit re-poll
/// of the automation service.
pub async fn history_update(body: HistoryPutRequest, state: AppState) -> ApiReply {
    let Some(key) = body.id.clone().or_else(|| body.task_id.clone()) else {
        return Ok(missing_fields(&["id", "task_id"]));
    };

    let wants_repoll = body.update.status == Some(EligibilityStatus::Pending)
        && body
            .update
            .interim_results
            .as_ref()
            .map(|interim| interim.is_empty())
            .unwrap_or(true);

    let item = match state.ledger.update(&key, body.update).await {
        Ok(item) => item,
        Err(e) => return Ok(error_reply(&e)),
    };

    if wants_repoll {
        match state.mantys.check_status(&item.task_id).await {
            Ok(raw) => {
                let attempts = state
                    .polling
                    .bump_attempts(&item.task_id)
                    .await
                    .unwrap_or(None);
                let (_, update) = update_for(&raw, attempts);
                return match state.ledger.update(&item.id, update).await {
                    Ok(repolled) => Ok(ok_json(&repolled)),
                    Err(e) => Ok(error_reply(&e)),
                };
            }
            Err(e) => {
                // The reset itself succeeded; the next poll will catch up.
                warn!("Implicit re-poll for task {} failed: {}", item.task_id, e);
            }
        }
    }
    Ok(ok_json(&item))
}

/// DELETE /eligibility-history
pub async fn history_delete(query: HistoryDeleteQuery, state: AppState) -> ApiReply {
    let Some(id) = query.id.filter(|v| !v.is_empty()) else {
        return Ok(missing_fields(&["id"]));
    };
    match state.ledger.delete(&id).await {
        Ok(()) => Ok(ok_json(&json!({"deleted": id}))),
        Err(e) => Ok(error_reply(&e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::mantys::{MantysDataDump, MantysDocument, MantysEligibilityResult};

    fn raw_with(status: &str, dump: MantysDataDump) -> MantysTaskStatus {
        MantysTaskStatus {
            task_id: Some("t-1".to_string()),
            status: Some(status.to_string()),
            eligibility_result: Some(MantysEligibilityResult {
                error: None,
                data_dump: Some(dump),
                policy_details: None,
            }),
        }
    }

    #[test]
    fn should_extract_interim_results_from_data_dump() {
        let raw = raw_with(
            "EXTRACTION_IN_PROGRESS",
            MantysDataDump {
                message: None,
                screenshot_url: Some("https://shots.example/1.png".to_string()),
                documents: Some(vec![MantysDocument {
                    name: "card.pdf".to_string(),
                    url: "https://docs.example/card.pdf".to_string(),
                }]),
            },
        );
        let interim = interim_results_of(&raw).unwrap();
        assert_eq!(
            interim.screenshot.as_deref(),
            Some("https://shots.example/1.png")
        );
        assert_eq!(interim.documents.len(), 1);
    }

    #[test]
    fn should_yield_no_interim_results_without_artifacts() {
        let raw = raw_with(
            "PROCESS_STARTED",
            MantysDataDump {
                message: Some("working".to_string()),
                screenshot_url: None,
                documents: None,
            },
        );
        assert!(interim_results_of(&raw).is_none());
    }

    #[test]
    fn should_stamp_error_message_for_failed_runs() {
        let raw = raw_with(
            "PROCESS_COMPLETE",
            MantysDataDump {
                message: Some("invalid credentials".to_string()),
                screenshot_url: None,
                documents: None,
            },
        );
        let (status, update) = update_for(&raw, Some(3));
        assert_eq!(status, EligibilityStatus::Error);
        assert_eq!(update.error.as_deref(), Some("invalid credentials"));
        assert!(update.completed_at.is_some());
        assert_eq!(update.polling_attempts, Some(3));
    }

    #[test]
    fn should_attach_result_payload_on_complete() {
        let raw = raw_with(
            "PROCESS_COMPLETE",
            MantysDataDump {
                message: Some("all good".to_string()),
                screenshot_url: None,
                documents: None,
            },
        );
        let (status, update) = update_for(&raw, None);
        assert_eq!(status, EligibilityStatus::Complete);
        assert!(update.result.is_some());
        assert!(update.error.is_none());
    }
}
