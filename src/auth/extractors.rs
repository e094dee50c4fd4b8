use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};

use super::token::{TokenExtractor, TokenService};
use crate::error::OsikatuError;

/// The caller of an authenticated request
///
/// Rejects with 401 when the bearer token is missing, malformed or expired.
///
/// ```rust,ignore
/// async fn list_oshi(user: AuthUser, State(ctx): State<AppContext>) -> Result<Json<Vec<Oshi>>> {
///     Ok(Json(ctx.oshi.list(&user.id).await?))
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    pub display_name: String,
}

impl<S> FromRequestParts<S> for AuthUser
where
    Arc<TokenService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = OsikatuError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = TokenExtractor::from_header(parts)?;
        let tokens = Arc::<TokenService>::from_ref(state);
        let claims = tokens.verify(&token)?;

        Ok(AuthUser {
            id: claims.sub,
            display_name: claims.name,
        })
    }
}

/// Like [`AuthUser`] but also accepts `?token=` for websocket upgrades
#[derive(Debug, Clone)]
pub struct WsAuthUser(pub AuthUser);

impl<S> FromRequestParts<S> for WsAuthUser
where
    Arc<TokenService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = OsikatuError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = TokenExtractor::from_header(parts)
            .or_else(|_| TokenExtractor::from_query(parts, "token"))?;
        let tokens = Arc::<TokenService>::from_ref(state);
        let claims = tokens.verify(&token)?;

        Ok(WsAuthUser(AuthUser {
            id: claims.sub,
            display_name: claims.name,
        }))
    }
}
