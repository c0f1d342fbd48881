use std::env;
use std::path::Path;

use serde_json::Value;
use tokio::fs;
use tracing::{info, warn};

use crate::types::UpdateError;

use super::{paths, Config};

pub const API_URL_ENV: &str = "CENTRALINO_API_URL";

impl Config {
    /// Load configuration from config.json in the app directory
    /// Falls back to defaults if the file doesn't exist or can't be parsed
    pub async fn load() -> Self {
        let mut config = match Self::try_load().await {
            Ok(config) => config,
            Err(err) => {
                warn!(error = ?err, "Failed to load config.json, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides();
        info!(
            api_url = %config.api_url,
            poll_interval_secs = config.poll_interval_secs,
            auto_start = config.auto_start,
            "Loaded configuration"
        );
        config
    }

    async fn try_load() -> Result<Self, UpdateError> {
        let config_path = paths::get_config_path()?;

        if !config_path.exists() {
            warn!(path = %config_path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&config_path).await
    }

    /// Read and parse a specific config file. Missing keys take their defaults.
    pub async fn load_from(path: &Path) -> Result<Self, UpdateError> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|err| UpdateError::Config(format!("Failed to read config file: {err}")))?;

        let value: Value = serde_json::from_str(&contents)
            .map_err(|err| UpdateError::Config(format!("Failed to parse config.json: {err}")))?;

        let mut config: Config = serde_json::from_value(value).map_err(|err| {
            UpdateError::Config(format!("Failed to deserialize config.json: {err}"))
        })?;

        if config.poll_interval_secs == 0 {
            warn!("poll_interval_secs must be positive, using 1");
            config.poll_interval_secs = 1;
        }
        if config.check_interval_secs == 0 {
            warn!("check_interval_secs must be positive, using default");
            config.check_interval_secs = Config::default().check_interval_secs;
        }

        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(custom) = env::var(API_URL_ENV) {
            let trimmed = custom.trim();
            if !trimmed.is_empty() {
                self.api_url = trimmed.to_string();
            }
        }
    }
}
