//! Accounts: Argon2id passwords, HS256 access tokens and the `AuthUser`
//! extractor.

pub mod extractors;
pub mod password;
mod routes;
mod service;
mod store;
pub mod token;

pub use extractors::{AuthUser, WsAuthUser};
pub use password::{PasswordConfig, PasswordHasher};
pub use routes::AccountModule;
pub use service::{AccountService, AuthResponse, LoginRequest, MeResponse, RegisterRequest};
pub use store::{InMemoryUserStore, User, UserStore, UserView};
pub use token::{AccessClaims, TokenExtractor, TokenResponse, TokenService};

use secrecy::{ExposeSecret, SecretString};

use crate::error::{OsikatuError, Result};
use crate::utils::{get_env_parsed, get_env_with_prefix};

/// HS256 needs at least this much key material.
pub const MIN_JWT_SECRET_LEN: usize = 32;

/// Token settings. The secret is never logged or serialized.
#[derive(Debug)]
pub struct AuthConfig {
    pub jwt_secret: SecretString,
    pub issuer: String,
    pub access_token_ttl_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: SecretString::from(String::new()),
            issuer: "osikatu".to_string(),
            access_token_ttl_seconds: 86_400,
        }
    }
}

impl AuthConfig {
    /// Reads `JWT_SECRET`, `JWT_ISSUER` and `ACCESS_TOKEN_TTL_SECONDS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(secret) = get_env_with_prefix("JWT_SECRET") {
            config.jwt_secret = SecretString::from(secret);
        }
        if let Some(issuer) = get_env_with_prefix("JWT_ISSUER") {
            config.issuer = issuer;
        }
        if let Some(ttl) = get_env_parsed("ACCESS_TOKEN_TTL_SECONDS") {
            config.access_token_ttl_seconds = ttl;
        }
        config
    }

    pub fn validate(&self) -> Result<()> {
        if self.jwt_secret.expose_secret().len() < MIN_JWT_SECRET_LEN {
            return Err(OsikatuError::bad_request(format!(
                "JWT secret must be at least {} bytes (set OSIKATU_JWT_SECRET)",
                MIN_JWT_SECRET_LEN
            )));
        }
        if self.issuer.trim().is_empty() {
            return Err(OsikatuError::bad_request("JWT issuer must not be empty"));
        }
        if self.access_token_ttl_seconds == 0 {
            return Err(OsikatuError::bad_request(
                "Access token TTL must be greater than 0",
            ));
        }
        Ok(())
    }
}
