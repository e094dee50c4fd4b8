use std::time::Duration;

use axum::http::request::Parts;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use super::AuthConfig;
use crate::error::{OsikatuError, Result};

/// Extracts bearer tokens from requests
pub struct TokenExtractor;

impl TokenExtractor {
    /// `Authorization: Bearer <token>`
    pub fn from_header(parts: &Parts) -> Result<String> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| OsikatuError::unauthorized("Missing authorization header"))?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            OsikatuError::unauthorized(
                "Invalid authorization header format. Expected: Bearer <token>",
            )
        })?;

        if token.trim().is_empty() {
            return Err(OsikatuError::unauthorized("Empty bearer token"));
        }

        Ok(token.trim().to_string())
    }

    /// Token from a query parameter. Browsers cannot set headers on websocket upgrades.
    pub fn from_query(parts: &Parts, param_name: &str) -> Result<String> {
        let query = parts
            .uri
            .query()
            .ok_or_else(|| OsikatuError::unauthorized("No query parameters"))?;

        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, value)| *key == param_name && !value.is_empty())
            .map(|(_, value)| value.to_string())
            .ok_or_else(|| {
                OsikatuError::unauthorized(format!("Query parameter '{}' not found", param_name))
            })
    }
}

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub iss: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
    pub name: String,
}

/// Token returned by register and login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

/// Issues and verifies HS256 access tokens.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    issuer: String,
    ttl: Duration,
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.jwt_secret.expose_secret().as_bytes();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            issuer: config.issuer.clone(),
            ttl: Duration::from_secs(config.access_token_ttl_seconds),
        }
    }

    pub fn issue(&self, user_id: &str, display_name: &str) -> Result<TokenResponse> {
        let now = Utc::now().timestamp();
        let claims = AccessClaims {
            sub: user_id.to_string(),
            iss: self.issuer.clone(),
            exp: now + self.ttl.as_secs() as i64,
            iat: now,
            jti: uuid::Uuid::new_v4().to_string(),
            name: display_name.to_string(),
        };

        let access_token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| OsikatuError::internal(format!("Failed to encode token: {}", e)))?;

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.ttl.as_secs(),
        })
    }

    pub fn verify(&self, token: &str) -> Result<AccessClaims> {
        decode::<AccessClaims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "Access token rejected");
                OsikatuError::unauthorized("Invalid or expired token")
            })
    }
}
