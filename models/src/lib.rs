// models/src/lib.rs

// Domain records shared by the broker library and server crates.
pub mod errors;
pub mod tpa;
pub mod plan_mapping;
pub mod history;
pub mod context;
pub mod his;
pub mod mantys;
pub mod clinic;

pub use errors::{BrokerError, BrokerResult};
pub use tpa::{InsuranceType, TpaConfig, TpaDiagnostics, RepairReport, ValidationReport};
pub use plan_mapping::{ImportReport, PlanMappingImport, PlanNetworkMapping};
pub use history::{
    EligibilityHistoryItem, EligibilityStatus, HistoryUpdate, InterimDocument, InterimResults,
    PollingTask,
};
pub use context::PatientContext;
pub use his::{HisBody, HisEnvelope, HisHead, InsuranceMapping};
pub use mantys::{MantysDataDump, MantysEligibilityResult, MantysTaskResponse, MantysTaskStatus};
pub use clinic::{ClinicConfig, ClinicNetwork, ClinicPlan, Doctor, MantysNetwork, Payer};
