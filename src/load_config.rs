use std::fs;
use std::path::Path;

use tracing::{error, info};

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};

pub const WORKERS_ENV: &str = "XATTR_SYNC_WORKERS";
pub const ENDPOINTS_ENV: &str = "XATTR_SYNC_ENDPOINTS";

/// Loads a YAML config file, applies environment overrides and validates.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SyncConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(SyncError::Config(format!(
                "failed to read config file {}: {e}",
                path_ref.display()
            )));
        }
    };

    let config: SyncConfig = if config_content.trim().is_empty() {
        SyncConfig::default()
    } else {
        match serde_yaml::from_str(&config_content) {
            Ok(conf) => {
                info!(config_path = ?path_ref, "Parsed config YAML successfully");
                conf
            }
            Err(e) => {
                error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
                return Err(SyncError::Config(format!("failed to parse config YAML: {e}")));
            }
        }
    };

    finish(config)
}

/// Built-in defaults with environment overrides, for runs without a config file.
pub fn default_config() -> Result<SyncConfig> {
    info!("No config file given, using built-in defaults");
    finish(SyncConfig::default())
}

fn finish(mut config: SyncConfig) -> Result<SyncConfig> {
    apply_env_overrides(&mut config)?;
    config.validate()?;
    config.trace_loaded();
    Ok(config)
}

fn apply_env_overrides(config: &mut SyncConfig) -> Result<()> {
    if let Ok(raw) = std::env::var(WORKERS_ENV) {
        config.workers = raw.trim().parse::<usize>().map_err(|e| {
            error!(error = ?e, raw = %raw, "XATTR_SYNC_WORKERS must be a positive integer");
            SyncError::Config(format!("{WORKERS_ENV} must be a positive integer: {e}"))
        })?;
        info!(workers = config.workers, "Worker count overridden from env");
    }

    if let Ok(raw) = std::env::var(ENDPOINTS_ENV) {
        config.endpoints = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        info!(endpoints = ?config.endpoints, "Endpoints overridden from env");
    }

    Ok(())
}
