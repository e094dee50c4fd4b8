use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;

use crate::utils::get_env_parsed;

/// Request timeout settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl TimeoutConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(enabled) = get_env_parsed("TIMEOUT_ENABLED") {
            config.enabled = enabled;
        }
        if let Some(seconds) = get_env_parsed("TIMEOUT_SECONDS") {
            config.timeout_seconds = seconds;
        }

        config
    }
}

fn default_enabled() -> bool {
    true
}

fn default_timeout_seconds() -> u64 {
    30
}

/// Build a tower-http TimeoutLayer from a TimeoutConfig
///
/// The chat websocket route is mounted outside this layer; long-lived
/// upgrades would otherwise be cut after `timeout_seconds`. Slow requests
/// get `408 Request Timeout`.
pub fn build_timeout_layer(config: &TimeoutConfig) -> Option<TimeoutLayer> {
    if !config.enabled {
        return None;
    }

    Some(TimeoutLayer::with_status_code(
        StatusCode::REQUEST_TIMEOUT,
        config.duration(),
    ))
}
