// lib/src/classify.rs
// Maps the automation service's raw status vocabulary onto the four-state
// lifecycle. The upstream API reports PROCESS_COMPLETE even for runs that
// failed inside the portal; the only failure signal is then an explicit
// error marker or a known keyword in the free-text message. That keyword
// match is inherently brittle, so the whole mapping lives in this one
// table, pinned by tests, instead of being scattered across handlers.

use models::history::EligibilityStatus;
use models::mantys::MantysTaskStatus;

/// Upstream status meaning the portal run finished.
pub const COMPLETE_SENTINEL: &str = "PROCESS_COMPLETE";

/// Upstream statuses meaning the run is mid-extraction.
pub const PROCESSING_SENTINELS: [&str; 3] = [
    "PROCESS_STARTED",
    "EXTRACTION_IN_PROGRESS",
    "DOCUMENT_UPLOAD_IN_PROGRESS",
];

/// Substrings that mark a "complete" run as failed when found in the
/// result message (case-insensitive).
pub const FAILURE_KEYWORDS: [&str; 4] = ["invalid", "error", "failed", "credentials"];

fn message_of(raw: &MantysTaskStatus) -> Option<&str> {
    raw.eligibility_result
        .as_ref()?
        .data_dump
        .as_ref()?
        .message
        .as_deref()
}

fn has_failure_marker(raw: &MantysTaskStatus) -> bool {
    if let Some(result) = &raw.eligibility_result {
        if result.error.is_some() {
            return true;
        }
    }
    match message_of(raw) {
        Some(message) => {
            let lowered = message.to_lowercase();
            FAILURE_KEYWORDS
                .iter()
                .any(|keyword| lowered.contains(keyword))
        }
        None => false,
    }
}

/// Classifies a raw upstream snapshot into the lifecycle state.
pub fn classify_task_status(raw: &MantysTaskStatus) -> EligibilityStatus {
    let status = raw.status.as_deref().unwrap_or("");
    if status == COMPLETE_SENTINEL {
        if has_failure_marker(raw) {
            return EligibilityStatus::Error;
        }
        return EligibilityStatus::Complete;
    }
    if PROCESSING_SENTINELS.contains(&status) {
        return EligibilityStatus::Processing;
    }
    EligibilityStatus::Pending
}
