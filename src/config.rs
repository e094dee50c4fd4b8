use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::auth::AuthConfig;
use crate::billing::BillingConfig;
use crate::error::{OsikatuError, Result};
use crate::gacha::GachaConfig;
use crate::middleware::{CorsConfig, TimeoutConfig};
use crate::oplog::RedactionPolicy;
use crate::points::PointsConfig;
use crate::utils::{get_env_parsed, get_env_with_prefix};

/// Main configuration for the Osikatu server
///
/// Sections holding secrets (`auth`, `billing`) keep them in
/// `secrecy::SecretString`, so the whole config is only `Debug`.
#[derive(Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub cors: CorsConfig,
    pub timeout: TimeoutConfig,
    pub auth: AuthConfig,
    pub billing: BillingConfig,
    pub gacha: GachaConfig,
    pub points: PointsConfig,
    pub oplog: RedactionPolicy,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum request body size in bytes (default: 1MB)
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_size: default_max_body_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_body_size() -> usize {
    1024 * 1024
}

impl ServerConfig {
    pub fn addr(&self) -> std::result::Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

/// Builder for Config with environment variable support
#[must_use = "builder does nothing until you call build()"]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config {
                server: ServerConfig::default(),
                logging: LoggingConfig::default(),
                cors: CorsConfig::default(),
                timeout: TimeoutConfig::default(),
                auth: AuthConfig::default(),
                billing: BillingConfig::default(),
                gacha: GachaConfig::default(),
                points: PointsConfig::default(),
                oplog: RedactionPolicy::default(),
            },
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.config.server.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.config.server.max_body_size = max_body_size;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn with_cors(mut self, cors: CorsConfig) -> Self {
        self.config.cors = cors;
        self
    }

    pub fn with_timeout(mut self, timeout: TimeoutConfig) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn with_jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.auth.jwt_secret = SecretString::from(secret.into());
        self
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.config.auth = auth;
        self
    }

    pub fn with_billing(mut self, billing: BillingConfig) -> Self {
        self.config.billing = billing;
        self
    }

    pub fn with_gacha(mut self, gacha: GachaConfig) -> Self {
        self.config.gacha = gacha;
        self
    }

    pub fn with_points(mut self, points: PointsConfig) -> Self {
        self.config.points = points;
        self
    }

    pub fn with_redaction(mut self, policy: RedactionPolicy) -> Self {
        self.config.oplog = policy;
        self
    }

    /// Load configuration from environment variables with OSIKATU_ prefix
    ///
    /// Fails only when a referenced file (the gacha pool) cannot be read.
    pub fn from_env(mut self) -> Result<Self> {
        if let Some(host) = get_env_with_prefix("HOST") {
            self.config.server.host = host;
        }
        // OSIKATU_PORT first, then PORT for platform deployments
        if let Some(port) = get_env_parsed("PORT") {
            self.config.server.port = port;
        }
        if let Some(size) = get_env_parsed("MAX_BODY_SIZE") {
            self.config.server.max_body_size = size;
        }
        if let Some(level) = get_env_with_prefix("LOG_LEVEL") {
            self.config.logging.level = level;
        }
        if let Some(json) = get_env_parsed("LOG_JSON") {
            self.config.logging.json = json;
        }

        self.config.cors = CorsConfig::from_env();
        self.config.timeout = TimeoutConfig::from_env();
        self.config.auth = AuthConfig::from_env();
        self.config.billing = BillingConfig::from_env();
        self.config.gacha = GachaConfig::from_env()?;
        self.config.points = PointsConfig::from_env();
        self.config.oplog = RedactionPolicy::from_env();

        Ok(self)
    }

    /// Build the configuration, validating all settings
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` describing the first invalid setting.
    pub fn build(self) -> Result<Config> {
        let config = self.config;

        config.server.addr().map_err(|e| {
            OsikatuError::bad_request(format!(
                "Invalid server address {}:{} - {}",
                config.server.host, config.server.port, e
            ))
        })?;

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.to_lowercase().as_str()) {
            return Err(OsikatuError::bad_request(format!(
                "Invalid log level: {}. Must be one of: {}",
                config.logging.level,
                valid_log_levels.join(", ")
            )));
        }

        if config.server.port == 0 {
            return Err(OsikatuError::bad_request("Server port must be greater than 0"));
        }

        if config.server.max_body_size == 0 {
            return Err(OsikatuError::bad_request(
                "Maximum body size must be greater than 0",
            ));
        }

        if config.timeout.enabled && config.timeout.timeout_seconds == 0 {
            return Err(OsikatuError::bad_request(
                "Request timeout must be greater than 0 when enabled",
            ));
        }

        config.auth.validate()?;
        config.billing.validate()?;
        config.gacha.validate()?;
        config.points.validate()?;
        config.oplog.validate()?;

        Ok(config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn test_defaults_need_a_jwt_secret() {
        let err = ConfigBuilder::new().build().unwrap_err();
        assert!(err.to_string().contains("JWT secret"));

        let config = ConfigBuilder::new().with_jwt_secret(SECRET).build().unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_invalid_log_level() {
        let result = ConfigBuilder::new()
            .with_jwt_secret(SECRET)
            .with_log_level("verbose")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_port_and_host() {
        assert!(
            ConfigBuilder::new()
                .with_jwt_secret(SECRET)
                .with_port(0)
                .build()
                .is_err()
        );
        assert!(
            ConfigBuilder::new()
                .with_jwt_secret(SECRET)
                .with_host("not a host")
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_zero_timeout_rejected_when_enabled() {
        let result = ConfigBuilder::new()
            .with_jwt_secret(SECRET)
            .with_timeout(TimeoutConfig {
                enabled: true,
                timeout_seconds: 0,
            })
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_gacha_costs_rejected() {
        let gacha = GachaConfig {
            single_cost: 0,
            ..GachaConfig::default()
        };
        let result = ConfigBuilder::new()
            .with_jwt_secret(SECRET)
            .with_gacha(gacha)
            .build();
        assert!(result.is_err());
    }
}
