use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

use crate::types::UpdateError;
use crate::update::OrchestratorSettings;

use super::Config;

impl Config {
    /// Full URL of the progress push channel, with the scheme switched to ws/wss.
    pub fn push_url(&self) -> String {
        let base = self.api_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!("{}/{}", ws_base, self.push_path.trim_start_matches('/'))
    }

    /// Timing knobs consumed by the orchestrator.
    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            check_interval: Duration::from_secs(self.check_interval_secs),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            health_timeout: Duration::from_millis(self.health_timeout_ms),
            check_timeout: Duration::from_millis(self.check_timeout_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            no_update_reset: Duration::from_millis(self.no_update_reset_ms),
        }
    }
}

/// Get the path to the config.json file
/// Looks for config.json in the app directory (parent of the bin folder)
pub(super) fn get_config_path() -> Result<PathBuf, UpdateError> {
    // Executable is at: app_root/bin/centralino-updater
    // Config should be at: app_root/config.json
    if let Ok(exe_path) = std::env::current_exe() {
        debug!(path = %exe_path.display(), "Executable path detected");

        if let Some(bin_dir) = exe_path.parent() {
            if let Some(app_root) = bin_dir.parent() {
                let config_path = app_root.join("config.json");
                debug!(path = %config_path.display(), "Looking for config");
                return Ok(config_path);
            }
        }
    }

    warn!("Using fallback: looking for config.json in current directory");
    Ok(PathBuf::from("config.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_url_follows_api_scheme() {
        let mut config = Config::default();
        assert_eq!(config.push_url(), "ws://localhost:8000/ws/update-progress");

        config.api_url = "https://centralino.lan:8443/".to_string();
        assert_eq!(config.push_url(), "wss://centralino.lan:8443/ws/update-progress");
    }

    #[test]
    fn settings_use_configured_timings() {
        let config = Config {
            poll_interval_secs: 5,
            health_timeout_ms: 750,
            ..Config::default()
        };
        let settings = config.orchestrator_settings();
        assert_eq!(settings.poll_interval, Duration::from_secs(5));
        assert_eq!(settings.health_timeout, Duration::from_millis(750));
        assert_eq!(settings.check_interval, Duration::from_secs(3600));
    }
}
