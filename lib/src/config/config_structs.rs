// lib/src/config/config_structs.rs

use std::fmt;
use serde::{Deserialize, Serialize};

/// Which key-value engine backs the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageEngineType {
    Redis,
    InMemory,
}

impl fmt::Display for StorageEngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageEngineType::Redis => write!(f, "redis"),
            StorageEngineType::InMemory => write!(f, "inmemory"),
        }
    }
}

impl std::str::FromStr for StorageEngineType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "redis" => Ok(StorageEngineType::Redis),
            "inmemory" | "in-memory" | "memory" => Ok(StorageEngineType::InMemory),
            other => Err(format!("unknown storage engine: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub storage_engine_type: StorageEngineType,
    #[serde(default)]
    pub connection_string: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            storage_engine_type: StorageEngineType::Redis,
            connection_string: Some("redis://127.0.0.1:6379".to_string()),
        }
    }
}

/// Numeric identifiers the HIS expects on every write payload. The source
/// system hardcoded these at call sites; they live here so deployments can
/// override them per environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HisDefaults {
    pub created_by: i64,
    pub vendor_id: i64,
    pub site_id: i64,
    pub customer_id: i64,
}

impl Default for HisDefaults {
    fn default() -> Self {
        HisDefaults {
            created_by: 13295,
            vendor_id: 24,
            site_id: 31,
            customer_id: 1,
        }
    }
}

/// Full runtime configuration. Base URLs and numeric ids carry fallback
/// defaults; API keys deliberately do not — call sites that need a missing
/// key fail with a configuration error instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub his_base_url: String,
    pub mantys_base_url: String,
    #[serde(default)]
    pub his_api_key: Option<String>,
    #[serde(default)]
    pub mantys_api_key: Option<String>,
    pub client_id: String,
    #[serde(default)]
    pub default_clinic_id: Option<String>,
    #[serde(default)]
    pub his_defaults: HisDefaults,
    #[serde(default)]
    pub storage: StorageConfig,
    pub bind_port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            his_base_url: "https://his.example.org/api/v1".to_string(),
            mantys_base_url: "https://api.mantys.example.org/v1".to_string(),
            his_api_key: None,
            mantys_api_key: None,
            client_id: "clinic-ops".to_string(),
            default_clinic_id: None,
            his_defaults: HisDefaults::default(),
            storage: StorageConfig::default(),
            bind_port: 8085,
        }
    }
}

/// Optional YAML overlay; every field is optional and wins over the
/// environment when present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfigFile {
    #[serde(default)]
    pub his_base_url: Option<String>,
    #[serde(default)]
    pub mantys_base_url: Option<String>,
    #[serde(default)]
    pub his_api_key: Option<String>,
    #[serde(default)]
    pub mantys_api_key: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub default_clinic_id: Option<String>,
    #[serde(default)]
    pub his_defaults: Option<HisDefaults>,
    #[serde(default)]
    pub storage: Option<StorageConfig>,
    #[serde(default)]
    pub bind_port: Option<u16>,
}
