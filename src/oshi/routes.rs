use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};

use super::{CreateOshiRequest, Oshi, UpdateOshiRequest};
use crate::app::AppContext;
use crate::auth::AuthUser;
use crate::error::Result;
use crate::http::{CreatedResponse, NoContentResponse, RouteModule};
use crate::validation::ValidatedJson;

pub struct OshiModule;

impl RouteModule for OshiModule {
    fn routes(&self) -> Router<AppContext> {
        Router::new()
            .route("/", get(list).post(create))
            .route("/{id}", get(show).patch(update).delete(remove))
            .route("/{id}/primary", post(set_primary))
    }

    fn prefix(&self) -> Option<&str> {
        Some("/oshi")
    }
}

async fn list(user: AuthUser, State(ctx): State<AppContext>) -> Result<Json<Vec<Oshi>>> {
    Ok(Json(ctx.oshi.list(&user.id).await?))
}

async fn create(
    user: AuthUser,
    State(ctx): State<AppContext>,
    ValidatedJson(req): ValidatedJson<CreateOshiRequest>,
) -> Result<CreatedResponse<Oshi>> {
    let oshi = ctx.oshi.create(&user.id, req).await?;
    let location = format!("/api/oshi/{}", oshi.id);
    Ok(CreatedResponse::new(oshi, location))
}

async fn show(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<Oshi>> {
    Ok(Json(ctx.oshi.get(&user.id, &id).await?))
}

async fn update(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateOshiRequest>,
) -> Result<Json<Oshi>> {
    Ok(Json(ctx.oshi.update(&user.id, &id, req).await?))
}

async fn remove(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<NoContentResponse> {
    ctx.oshi.delete(&user.id, &id).await?;
    Ok(NoContentResponse)
}

async fn set_primary(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<Oshi>> {
    Ok(Json(ctx.oshi.set_primary(&user.id, &id).await?))
}
