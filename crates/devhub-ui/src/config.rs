use std::{
    fs, io,
    path::{Path, PathBuf},
};

use devhub_util::{state_file_path, write_json_atomic};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::UiError;

const CONFIG_FILE: &str = "devhub-config.json";

const CHANNEL_PLACEHOLDER: &str = "{channel}";

pub const FEED_URL_ENV: &str = "DEVHUB_FEED_URL";
pub const UPDATE_CHANNEL_ENV: &str = "DEVHUB_UPDATE_CHANNEL";
pub const ENV_CHECK_ENV: &str = "DEVHUB_ENV_CHECK";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub safety_notice: bool,
    pub update_channel: String,
    pub feed_url: String,
    pub env_check_command: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            safety_notice: true,
            update_channel: "stable".into(),
            feed_url: String::new(),
            env_check_command: "su -c env_check".into(),
        }
    }
}

impl AppConfig {
    /// Reads `path`, falling back to defaults when the file is missing or
    /// broken. Environment overrides win over the file either way.
    pub fn load_from(path: &Path) -> Self {
        let mut cfg = match fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str::<AppConfig>(&data) {
                Ok(file_cfg) => file_cfg,
                Err(err) => {
                    warn!("Failed to parse {}: {err}", path.display());
                    AppConfig::default()
                }
            },
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to read {}: {err}", path.display());
                }
                AppConfig::default()
            }
        };
        cfg.apply_env_overrides();
        cfg
    }

    /// The feed to read: `feed_url` with any `{channel}` placeholder replaced
    /// by `update_channel`. `None` when no feed is configured.
    pub fn feed_source(&self) -> Option<String> {
        let url = self.feed_url.trim();
        if url.is_empty() {
            return None;
        }
        Some(url.replace(CHANNEL_PLACEHOLDER, self.update_channel.trim()))
    }

    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        write_json_atomic(path, self)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(value) = non_empty_env(FEED_URL_ENV) {
            self.feed_url = value;
        }
        if let Some(value) = non_empty_env(UPDATE_CHANNEL_ENV) {
            self.update_channel = value;
        }
        if let Some(value) = non_empty_env(ENV_CHECK_ENV) {
            self.env_check_command = value;
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn default_config_path() -> PathBuf {
    state_file_path(CONFIG_FILE)
}

/// A loaded config plus the file it persists to.
#[derive(Clone, Debug)]
pub struct ConfigStore {
    path: PathBuf,
    config: AppConfig,
}

impl ConfigStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let config = AppConfig::load_from(&path);
        Self { path, config }
    }

    pub fn open_default() -> Self {
        Self::open(default_config_path())
    }

    /// Wraps an already-built config without reading `path`. `update` still
    /// writes there.
    pub fn with_config(path: impl Into<PathBuf>, config: AppConfig) -> Self {
        Self {
            path: path.into(),
            config,
        }
    }

    pub fn get(&self) -> &AppConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Applies `change` and writes the result immediately.
    pub fn update(&mut self, change: impl FnOnce(&mut AppConfig)) -> Result<(), UiError> {
        change(&mut self.config);
        self.config
            .save_to(&self.path)
            .map_err(|err| UiError::Config(format!("failed to write {}: {err}", self.path.display())))
    }
}
