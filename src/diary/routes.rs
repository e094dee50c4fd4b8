use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};

use super::{CreateDiaryRequest, CreatedDiaryEntry, DiaryEntry, DiaryFilter, UpdateDiaryRequest};
use crate::app::AppContext;
use crate::auth::AuthUser;
use crate::error::Result;
use crate::http::{CreatedResponse, NoContentResponse, PaginatedData, PaginationQuery, RouteModule};
use crate::validation::ValidatedJson;

pub struct DiaryModule;

impl RouteModule for DiaryModule {
    fn routes(&self) -> Router<AppContext> {
        Router::new()
            .route("/", get(list).post(create))
            .route("/{id}", get(show).patch(update).delete(remove))
    }

    fn prefix(&self) -> Option<&str> {
        Some("/diary")
    }
}

async fn list(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Query(filter): Query<DiaryFilter>,
    Query(page): Query<PaginationQuery>,
) -> Result<PaginatedData<DiaryEntry>> {
    ctx.diary.list(&user.id, &filter, &page).await
}

async fn create(
    user: AuthUser,
    State(ctx): State<AppContext>,
    ValidatedJson(req): ValidatedJson<CreateDiaryRequest>,
) -> Result<CreatedResponse<CreatedDiaryEntry>> {
    let created = ctx.diary.create(&user.id, req).await?;
    let location = format!("/api/diary/{}", created.entry.id);
    Ok(CreatedResponse::new(created, location))
}

async fn show(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<DiaryEntry>> {
    Ok(Json(ctx.diary.get(&user.id, &id).await?))
}

async fn update(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateDiaryRequest>,
) -> Result<Json<DiaryEntry>> {
    Ok(Json(ctx.diary.update(&user.id, &id, req).await?))
}

async fn remove(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<NoContentResponse> {
    ctx.diary.delete(&user.id, &id).await?;
    Ok(NoContentResponse)
}
