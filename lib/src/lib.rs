// lib/src/lib.rs

pub mod background;
pub mod classify;
pub mod clinic_collections;
pub mod config;
pub mod connectors;
pub mod context_cache;
pub mod history;
pub mod keys;
pub mod plan_mappings;
pub mod retry;
pub mod storage_engine;
pub mod tpa_store;

// Import directly from the 'models' crate.
pub use models::{BrokerError, BrokerResult};

// Explicit re-exports
pub use crate::background::{BackgroundJob, BackgroundWriter};
pub use crate::classify::classify_task_status;
pub use crate::clinic_collections::{ClinicCollections, CollectionKind};
pub use crate::config::{AppConfig, HisDefaults, StorageConfig, StorageEngineType};
pub use crate::connectors::his::{
    build_save_order_payload, build_save_policy_payload, resolve_insurance_mapping_id,
};
pub use crate::connectors::{HisClient, MantysClient};
pub use crate::context_cache::ContextCache;
pub use crate::history::ledger::NewHistoryItem;
pub use crate::history::{HistoryLedger, PollingTaskList};
pub use crate::plan_mappings::PlanMappingStore;
pub use crate::retry::retry_with_backoff;
pub use crate::storage_engine::{create_storage, InMemoryStorage, KvStore};
pub use crate::tpa_store::{validate_tpa_config, TpaConfigStore};
