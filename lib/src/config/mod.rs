// lib/src/config/mod.rs

pub mod config_structs;
pub mod config_helpers;

pub use config_structs::{AppConfig, AppConfigFile, HisDefaults, StorageConfig, StorageEngineType};
pub use config_helpers::{load_app_config, load_config_file};
