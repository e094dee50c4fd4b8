use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};

use super::{CreateGoodsRequest, GoodsFilter, GoodsItem, UpdateGoodsRequest};
use crate::app::AppContext;
use crate::auth::AuthUser;
use crate::error::Result;
use crate::http::{CreatedResponse, NoContentResponse, PaginatedData, PaginationQuery, RouteModule};
use crate::validation::ValidatedJson;

pub struct GoodsModule;

impl RouteModule for GoodsModule {
    fn routes(&self) -> Router<AppContext> {
        Router::new()
            .route("/", get(list).post(create))
            .route("/{id}", get(show).patch(update).delete(remove))
    }

    fn prefix(&self) -> Option<&str> {
        Some("/goods")
    }
}

async fn list(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Query(filter): Query<GoodsFilter>,
    Query(page): Query<PaginationQuery>,
) -> Result<PaginatedData<GoodsItem>> {
    ctx.goods.list(&user.id, &filter, &page).await
}

async fn create(
    user: AuthUser,
    State(ctx): State<AppContext>,
    ValidatedJson(req): ValidatedJson<CreateGoodsRequest>,
) -> Result<CreatedResponse<GoodsItem>> {
    let item = ctx.goods.create(&user.id, req).await?;
    let location = format!("/api/goods/{}", item.id);
    Ok(CreatedResponse::new(item, location))
}

async fn show(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<GoodsItem>> {
    Ok(Json(ctx.goods.get(&user.id, &id).await?))
}

async fn update(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateGoodsRequest>,
) -> Result<Json<GoodsItem>> {
    Ok(Json(ctx.goods.update(&user.id, &id, req).await?))
}

async fn remove(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<NoContentResponse> {
    ctx.goods.delete(&user.id, &id).await?;
    Ok(NoContentResponse)
}
