use axum::{
    Json, Router,
    extract::{Query, State},
    routing::{get, post},
};

use super::{DrawRequest, DrawResult, PoolView};
use crate::app::AppContext;
use crate::auth::AuthUser;
use crate::error::Result;
use crate::http::{PaginatedData, PaginationQuery, RouteModule};
use crate::validation::ValidatedJson;

pub struct GachaModule;

impl RouteModule for GachaModule {
    fn routes(&self) -> Router<AppContext> {
        Router::new()
            .route("/pool", get(pool))
            .route("/draw", post(draw))
            .route("/history", get(history))
    }

    fn prefix(&self) -> Option<&str> {
        Some("/gacha")
    }
}

async fn pool(_user: AuthUser, State(ctx): State<AppContext>) -> Json<PoolView> {
    Json(ctx.gacha.pool())
}

async fn draw(
    user: AuthUser,
    State(ctx): State<AppContext>,
    ValidatedJson(req): ValidatedJson<DrawRequest>,
) -> Result<Json<DrawResult>> {
    let result = ctx.gacha.draw(&user.id, req.count, &req.request_id).await?;
    Ok(Json(result))
}

async fn history(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Query(page): Query<PaginationQuery>,
) -> Result<PaginatedData<DrawResult>> {
    ctx.gacha.history(&user.id, &page).await
}
