// lib/src/config/config_helpers.rs

use std::env;
use std::path::Path;
use anyhow::{Context, Result};
use log::{info, warn};

use super::config_structs::{AppConfig, AppConfigFile, StorageEngineType};

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    match env_var(name) {
        Some(raw) => match raw.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring unparsable {}={}", name, raw);
                None
            }
        },
        None => None,
    }
}

/// Reads configuration from the environment, starting from the built-in
/// defaults. Secrets have no defaults: an unset key stays `None`.
pub fn app_config_from_env() -> AppConfig {
    let mut config = AppConfig::default();

    if let Some(v) = env_var("HIS_BASE_URL") {
        config.his_base_url = v;
    }
    if let Some(v) = env_var("MANTYS_BASE_URL") {
        config.mantys_base_url = v;
    }
    config.his_api_key = env_var("HIS_API_KEY");
    config.mantys_api_key = env_var("MANTYS_API_KEY");
    if let Some(v) = env_var("CLIENT_ID") {
        config.client_id = v;
    }
    config.default_clinic_id = env_var("CLINIC_ID");

    if let Some(v) = env_parse("HIS_CREATED_BY") {
        config.his_defaults.created_by = v;
    }
    if let Some(v) = env_parse("HIS_VENDOR_ID") {
        config.his_defaults.vendor_id = v;
    }
    if let Some(v) = env_parse("HIS_SITE_ID") {
        config.his_defaults.site_id = v;
    }
    if let Some(v) = env_parse("HIS_CUSTOMER_ID") {
        config.his_defaults.customer_id = v;
    }

    if let Some(engine) = env_parse::<StorageEngineType>("STORAGE_ENGINE") {
        config.storage.storage_engine_type = engine;
    }
    if let Some(url) = env_var("REDIS_URL") {
        config.storage.connection_string = Some(url);
    }
    if let Some(port) = env_parse("BIND_PORT") {
        config.bind_port = port;
    }

    config
}

/// Loads the optional YAML overlay file.
pub fn load_config_file(path: &Path) -> Result<AppConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {:?}", path))?;
    let file: AppConfigFile = serde_yaml2::from_str(&raw)
        .with_context(|| format!("Failed to parse config file {:?}", path))?;
    Ok(file)
}

fn apply_overlay(config: &mut AppConfig, overlay: AppConfigFile) {
    if let Some(v) = overlay.his_base_url {
        config.his_base_url = v;
    }
    if let Some(v) = overlay.mantys_base_url {
        config.mantys_base_url = v;
    }
    if overlay.his_api_key.is_some() {
        config.his_api_key = overlay.his_api_key;
    }
    if overlay.mantys_api_key.is_some() {
        config.mantys_api_key = overlay.mantys_api_key;
    }
    if let Some(v) = overlay.client_id {
        config.client_id = v;
    }
    if overlay.default_clinic_id.is_some() {
        config.default_clinic_id = overlay.default_clinic_id;
    }
    if let Some(v) = overlay.his_defaults {
        config.his_defaults = v;
    }
    if let Some(v) = overlay.storage {
        config.storage = v;
    }
    if let Some(v) = overlay.bind_port {
        config.bind_port = v;
    }
}

/// Environment first, then the YAML file when given. The file wins so a
/// deployment can pin everything in one place.
pub fn load_app_config(config_path: Option<&Path>) -> Result<AppConfig> {
    let mut config = app_config_from_env();
    if let Some(path) = config_path {
        let overlay = load_config_file(path)?;
        apply_overlay(&mut config, overlay);
        info!("Loaded config overlay from {:?}", path);
    }
    Ok(config)
}
