use serde::{Deserialize, Serialize};

/// Configuration for the centralino update monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_push_path")]
    pub push_path: String,

    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_health_timeout_ms")]
    pub health_timeout_ms: u64,

    /// The backend asks the release host before answering a version check.
    #[serde(default = "default_check_timeout_ms")]
    pub check_timeout_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    #[serde(default = "default_no_update_reset_ms")]
    pub no_update_reset_ms: u64,

    /// Start an offered update without waiting for confirmation.
    #[serde(default)]
    pub auto_start: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            push_path: default_push_path(),
            check_interval_secs: default_check_interval_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            request_timeout_ms: default_request_timeout_ms(),
            health_timeout_ms: default_health_timeout_ms(),
            check_timeout_ms: default_check_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            no_update_reset_ms: default_no_update_reset_ms(),
            auto_start: false,
        }
    }
}

fn default_api_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_push_path() -> String {
    "/ws/update-progress".to_string()
}

fn default_check_interval_secs() -> u64 {
    60 * 60
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_request_timeout_ms() -> u64 {
    3_000
}

fn default_health_timeout_ms() -> u64 {
    2_000
}

fn default_check_timeout_ms() -> u64 {
    15_000
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_reconnect_delay_ms() -> u64 {
    2_000
}

fn default_no_update_reset_ms() -> u64 {
    3_000
}
