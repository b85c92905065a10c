use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const CONFIG_DIR: &str = "story-companion";
const CONFIG_FILE: &str = "config.json";

pub const DEFAULT_API_ORIGIN: &str = "http://localhost:8000";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
pub const MIN_POLL_INTERVAL_MS: u64 = 100;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

pub const ENV_API_ORIGIN: &str = "COMPANION_API_ORIGIN";
pub const ENV_ASSET_ROOT: &str = "COMPANION_ASSET_ROOT";
pub const ENV_POLL_INTERVAL_MS: &str = "COMPANION_POLL_INTERVAL_MS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No config directory on this platform")]
    NoConfigDir,

    #[error("Failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_origin: String,
    /// Where server-relative media paths are resolved. Falls back to `api_origin`.
    pub asset_root: Option<String>,
    pub poll_interval_ms: u64,
    /// 0 disables the per-request timeout
    pub request_timeout_secs: u64,
    pub data_dir: Option<PathBuf>,
    pub input_device_name: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_origin: DEFAULT_API_ORIGIN.to_string(),
            asset_root: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            data_dir: None,
            input_device_name: None,
        }
    }
}

impl AppConfig {
    pub fn asset_root(&self) -> &str {
        self.asset_root.as_deref().unwrap_or(&self.api_origin)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Directory holding the persisted conversation id.
    pub fn data_dir(&self) -> Result<PathBuf, ConfigError> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        dirs::data_dir()
            .or_else(dirs::config_dir)
            .map(|dir| dir.join(CONFIG_DIR))
            .ok_or(ConfigError::NoConfigDir)
    }
}

pub fn normalize_origin(input: &str) -> Option<String> {
    let trimmed = input.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_poll_interval(ms: u64) -> u64 {
    ms.max(MIN_POLL_INTERVAL_MS)
}

/// Load the user config (creating it if missing) and apply environment overrides.
pub fn load_or_create() -> Result<AppConfig, ConfigError> {
    let path = config_path()?;
    let mut config = load_from(&path)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Read the config at `path`. A missing file is written with defaults; an unparsable one is
/// backed up to `config.json.bak` and replaced.
pub fn load_from(path: &Path) -> Result<AppConfig, ConfigError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            action: "create",
            path: dir.to_path_buf(),
            source,
        })?;
    }

    if !path.exists() {
        let config = AppConfig::default();
        save_raw(path, &config)?;
        tracing::info!("Created default config at {}", path.display());
        return Ok(config);
    }

    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        action: "read",
        path: path.to_path_buf(),
        source,
    })?;
    match serde_json::from_str::<AppConfig>(&raw) {
        Ok(mut config) => {
            normalize_config(&mut config);
            Ok(config)
        }
        Err(e) => {
            tracing::warn!("Config at {} is unreadable ({}), resetting", path.display(), e);
            let backup = path.with_extension("json.bak");
            let _ = fs::copy(path, backup);
            let config = AppConfig::default();
            save_raw(path, &config)?;
            Ok(config)
        }
    }
}

/// Environment wins over the file. Blank or unparsable values are ignored.
pub fn apply_env_overrides(config: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(origin) = lookup(ENV_API_ORIGIN).as_deref().and_then(normalize_origin) {
        config.api_origin = origin;
    }

    if let Some(root) = lookup(ENV_ASSET_ROOT).as_deref().and_then(normalize_origin) {
        config.asset_root = Some(root);
    }

    if let Some(raw) = lookup(ENV_POLL_INTERVAL_MS) {
        match raw.trim().parse::<u64>() {
            Ok(ms) => config.poll_interval_ms = normalize_poll_interval(ms),
            Err(_) => tracing::warn!("Ignoring {}='{}'", ENV_POLL_INTERVAL_MS, raw),
        }
    }
}

fn config_path() -> Result<PathBuf, ConfigError> {
    let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    Ok(dir.join(CONFIG_DIR).join(CONFIG_FILE))
}

fn save_raw(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    let json = serde_json::to_string_pretty(config)?;
    fs::write(path, json).map_err(|source| ConfigError::Io {
        action: "write",
        path: path.to_path_buf(),
        source,
    })
}

fn normalize_config(config: &mut AppConfig) {
    config.api_origin =
        normalize_origin(&config.api_origin).unwrap_or_else(|| DEFAULT_API_ORIGIN.to_string());
    config.asset_root = config.asset_root.as_deref().and_then(normalize_origin);
    config.poll_interval_ms = normalize_poll_interval(config.poll_interval_ms);
    config.input_device_name = normalize_device_name(config.input_device_name.take());
    if config
        .data_dir
        .as_ref()
        .is_some_and(|dir| dir.as_os_str().is_empty())
    {
        config.data_dir = None;
    }
}

fn normalize_device_name(name: Option<String>) -> Option<String> {
    name.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
