// server/src/api/mod.rs

pub mod handlers_aster;
pub mod handlers_clinic_config;
pub mod handlers_eligibility;
pub mod handlers_patient;
pub mod replies;
pub mod routes;

use std::sync::Arc;

use lib::background::BackgroundWriter;
use lib::clinic_collections::ClinicCollections;
use lib::config::AppConfig;
use lib::connectors::{HisClient, MantysClient};
use lib::context_cache::ContextCache;
use lib::history::{HistoryLedger, PollingTaskList};
use lib::plan_mappings::PlanMappingStore;
use lib::storage_engine::KvStore;
use lib::tpa_store::TpaConfigStore;

pub use routes::routes;

/// Everything a request handler needs, built once at startup and cloned
/// per request. No lazy globals: the storage handle is injected here and
/// nowhere else.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub tpa: TpaConfigStore,
    pub mappings: PlanMappingStore,
    pub collections: ClinicCollections,
    pub ledger: HistoryLedger,
    pub polling: PollingTaskList,
    pub contexts: ContextCache,
    pub background: BackgroundWriter,
    pub his: Arc<HisClient>,
    pub mantys: Arc<MantysClient>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, store: Arc<dyn KvStore>) -> Self {
        let contexts = ContextCache::new(store.clone());
        AppState {
            tpa: TpaConfigStore::new(store.clone()),
            mappings: PlanMappingStore::new(store.clone()),
            collections: ClinicCollections::new(store.clone()),
            ledger: HistoryLedger::new(store.clone()),
            polling: PollingTaskList::new(store),
            background: BackgroundWriter::spawn(contexts.clone()),
            contexts,
            his: Arc::new(HisClient::new(&config)),
            mantys: Arc::new(MantysClient::new(&config)),
            config,
        }
    }

    /// Clinic scope for a request: explicit value first, then the
    /// deployment default.
    pub fn clinic_id(&self, given: Option<&str>) -> Option<String> {
        given
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string())
            .or_else(|| self.config.default_clinic_id.clone())
    }
}
