use axum::http::{HeaderName, HeaderValue, Method};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

use crate::utils::{get_env_list, get_env_parsed};

/// CORS settings for the web and mobile frontends
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Allowed origins, e.g. `["https://osikatu.app"]`. `["*"]` allows any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    #[serde(default = "default_allowed_methods")]
    pub allowed_methods: Vec<String>,

    #[serde(default = "default_allowed_headers")]
    pub allowed_headers: Vec<String>,

    /// Whether to allow credentials (cookies, authorization headers)
    #[serde(default)]
    pub allow_credentials: bool,

    /// Maximum age for preflight request caching (in seconds)
    #[serde(default = "default_max_age")]
    pub max_age_seconds: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allowed_origins: Vec::new(),
            allowed_methods: default_allowed_methods(),
            allowed_headers: default_allowed_headers(),
            allow_credentials: false,
            max_age_seconds: default_max_age(),
        }
    }
}

impl CorsConfig {
    /// Allow any origin. Local development only.
    pub fn permissive() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec!["*".to_string()],
            ..Default::default()
        }
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(enabled) = get_env_parsed("CORS_ENABLED") {
            config.enabled = enabled;
        }
        if let Some(origins) = get_env_list("CORS_ALLOWED_ORIGINS") {
            config.allowed_origins = origins;
        }
        if let Some(methods) = get_env_list("CORS_ALLOWED_METHODS") {
            config.allowed_methods = methods;
        }
        if let Some(headers) = get_env_list("CORS_ALLOWED_HEADERS") {
            config.allowed_headers = headers;
        }
        if let Some(credentials) = get_env_parsed("CORS_ALLOW_CREDENTIALS") {
            config.allow_credentials = credentials;
        }
        if let Some(max_age) = get_env_parsed("CORS_MAX_AGE") {
            config.max_age_seconds = max_age;
        }

        config
    }

    fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }
}

fn default_allowed_methods() -> Vec<String> {
    ["GET", "POST", "PATCH", "DELETE", "OPTIONS"]
        .iter()
        .map(|m| m.to_string())
        .collect()
}

fn default_allowed_headers() -> Vec<String> {
    ["content-type", "authorization", "x-request-id"]
        .iter()
        .map(|h| h.to_string())
        .collect()
}

fn default_max_age() -> u64 {
    3600
}

/// Build a tower-http CorsLayer from a CorsConfig
pub fn build_cors_layer(config: &CorsConfig) -> Option<CorsLayer> {
    if !config.enabled {
        return None;
    }

    let mut layer = CorsLayer::new();

    if config.allows_any_origin() {
        layer = layer.allow_origin(Any);
    } else if !config.allowed_origins.is_empty() {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        layer = layer.allow_origin(origins);
    }

    let methods: Vec<Method> = config
        .allowed_methods
        .iter()
        .filter_map(|m| m.parse().ok())
        .collect();
    if !methods.is_empty() {
        layer = layer.allow_methods(methods);
    }

    let headers: Vec<HeaderName> = config
        .allowed_headers
        .iter()
        .filter_map(|h| h.parse().ok())
        .collect();
    if !headers.is_empty() {
        layer = layer.allow_headers(headers);
    }

    layer = layer.expose_headers([HeaderName::from_static(super::REQUEST_ID_HEADER)]);

    // tower-http panics on credentials combined with a wildcard origin
    if config.allow_credentials && !config.allows_any_origin() {
        layer = layer.allow_credentials(true);
    }

    Some(layer.max_age(Duration::from_secs(config.max_age_seconds)))
}
