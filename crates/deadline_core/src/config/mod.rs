use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE_NAME: &str = "config.json";
const CONFIG_ENV_VAR: &str = "DEADLINE_CONFIG_PATH";
const APP_DIR_NAME: &str = "deadline-tracker";

pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Task store location; `DEADLINE_STORE_PATH` still wins over this.
    pub store_path: Option<PathBuf>,
    pub scan_interval_secs: u64,
    pub local_notifications: bool,
    pub remote_push: RemotePushConfig,
    pub log_level: Option<String>,
    /// File logging is off unless a directory is given.
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: None,
            scan_interval_secs: DEFAULT_SCAN_INTERVAL_SECS,
            local_notifications: true,
            remote_push: RemotePushConfig::default(),
            log_level: None,
            log_dir: None,
        }
    }
}

impl Config {
    /// Clamped to at least one second.
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemotePushConfig {
    pub enabled: bool,
    pub target: Option<String>,
    pub credentials_path: Option<PathBuf>,
    pub timeout_ms: u64,
}

impl RemotePushConfig {
    pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;
}

impl Default for RemotePushConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            target: None,
            credentials_path: None,
            timeout_ms: Self::DEFAULT_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: Config,
    pub error: Option<AppError>,
}

/// Values given on the command line; `None` leaves the file value alone.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub scan_interval_secs: Option<u64>,
    pub local_notifications: Option<bool>,
    pub remote_push_enabled: Option<bool>,
    pub remote_push_target: Option<String>,
    pub log_level: Option<String>,
}

pub fn config_path() -> Result<PathBuf, AppError> {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR)
        && !path.trim().is_empty()
    {
        return Ok(PathBuf::from(path));
    }

    if cfg!(windows) {
        let appdata =
            std::env::var("APPDATA").map_err(|_| AppError::invalid_data("APPDATA is not set"))?;
        Ok(PathBuf::from(appdata)
            .join(APP_DIR_NAME)
            .join(CONFIG_FILE_NAME))
    } else {
        let home = std::env::var("HOME").map_err(|_| AppError::invalid_data("HOME is not set"))?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join(APP_DIR_NAME)
            .join(CONFIG_FILE_NAME))
    }
}

pub fn load_config() -> Result<Config, AppError> {
    let path = config_path()?;
    load_config_from_path(&path)
}

/// Defaults when the file is absent; defaults plus the error when it is
/// unreadable or malformed.
pub fn load_config_with_fallback() -> ConfigLoad {
    match config_path() {
        Ok(path) => load_config_with_fallback_from_path(&path),
        Err(err) => ConfigLoad {
            config: Config::default(),
            error: Some(err),
        },
    }
}

fn load_config_with_fallback_from_path(path: &Path) -> ConfigLoad {
    if !path.exists() {
        return ConfigLoad {
            config: Config::default(),
            error: None,
        };
    }

    match load_config_from_path(path) {
        Ok(config) => ConfigLoad {
            config,
            error: None,
        },
        Err(err) => ConfigLoad {
            config: Config::default(),
            error: Some(err),
        },
    }
}

fn load_config_from_path(path: &Path) -> Result<Config, AppError> {
    let content = std::fs::read_to_string(path)
        .map_err(|err| AppError::io(format!("{}: {}", path.display(), err)))?;
    let config: Config = serde_json::from_str(&content).map_err(|err| {
        AppError::invalid_data(format!("invalid JSON in {}: {}", path.display(), err))
    })?;
    Ok(normalize_config(config))
}

fn normalize_config(mut config: Config) -> Config {
    config.log_level = normalize_text(config.log_level);
    config.remote_push.target = normalize_text(config.remote_push.target);
    config
}

fn normalize_text(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

pub fn merge_overrides(base: &Config, overrides: &ConfigOverrides) -> Config {
    let mut merged = base.clone();

    if let Some(secs) = overrides.scan_interval_secs {
        merged.scan_interval_secs = secs;
    }
    if let Some(enabled) = overrides.local_notifications {
        merged.local_notifications = enabled;
    }
    if let Some(enabled) = overrides.remote_push_enabled {
        merged.remote_push.enabled = enabled;
    }
    if let Some(target) = normalize_text(overrides.remote_push_target.clone()) {
        merged.remote_push.target = Some(target);
    }
    if let Some(level) = normalize_text(overrides.log_level.clone()) {
        merged.log_level = Some(level);
    }

    merged
}
