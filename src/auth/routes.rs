use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};

use super::{AuthResponse, AuthUser, LoginRequest, MeResponse, RegisterRequest};
use crate::app::AppContext;
use crate::error::Result;
use crate::http::{CreatedResponse, RouteModule};
use crate::validation::ValidatedJson;

/// `/auth/register`, `/auth/login` and `/me`
pub struct AccountModule;

impl RouteModule for AccountModule {
    fn routes(&self) -> Router<AppContext> {
        Router::new()
            .route("/auth/register", post(register))
            .route("/auth/login", post(login))
            .route("/me", get(me))
    }
}

async fn register(
    State(ctx): State<AppContext>,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<CreatedResponse<AuthResponse>> {
    let registered = ctx.accounts.register(req).await?;
    Ok(CreatedResponse::new(registered, "/api/me"))
}

async fn login(
    State(ctx): State<AppContext>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    Ok(Json(ctx.accounts.login(req).await?))
}

async fn me(user: AuthUser, State(ctx): State<AppContext>) -> Result<Json<MeResponse>> {
    Ok(Json(ctx.accounts.me(&user.id).await?))
}
