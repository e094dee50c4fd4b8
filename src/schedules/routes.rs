use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};

use super::{CreateScheduleRequest, ScheduleRange, ScheduleView, UpcomingQuery, UpdateScheduleRequest};
use crate::app::AppContext;
use crate::auth::AuthUser;
use crate::error::Result;
use crate::http::{CreatedResponse, NoContentResponse, RouteModule};
use crate::validation::{ValidatedJson, ValidatedQuery};

pub struct ScheduleModule;

impl RouteModule for ScheduleModule {
    fn routes(&self) -> Router<AppContext> {
        Router::new()
            .route("/", get(list).post(create))
            .route("/upcoming", get(upcoming))
            .route("/{id}", get(show).patch(update).delete(remove))
    }

    fn prefix(&self) -> Option<&str> {
        Some("/schedules")
    }
}

async fn list(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Query(range): Query<ScheduleRange>,
) -> Result<Json<Vec<ScheduleView>>> {
    let schedules = ctx.schedules.list(&user.id, &range).await?;
    Ok(Json(schedules.into_iter().map(ScheduleView::from).collect()))
}

async fn upcoming(
    user: AuthUser,
    State(ctx): State<AppContext>,
    ValidatedQuery(query): ValidatedQuery<UpcomingQuery>,
) -> Result<Json<Vec<ScheduleView>>> {
    let schedules = ctx
        .schedules
        .upcoming(&user.id, crate::utils::now(), query.limit)
        .await?;
    Ok(Json(schedules.into_iter().map(ScheduleView::from).collect()))
}

async fn create(
    user: AuthUser,
    State(ctx): State<AppContext>,
    ValidatedJson(req): ValidatedJson<CreateScheduleRequest>,
) -> Result<CreatedResponse<ScheduleView>> {
    let schedule = ctx.schedules.create(&user.id, req).await?;
    let location = format!("/api/schedules/{}", schedule.id);
    Ok(CreatedResponse::new(schedule.into(), location))
}

async fn show(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<ScheduleView>> {
    Ok(Json(ctx.schedules.get(&user.id, &id).await?.into()))
}

async fn update(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateScheduleRequest>,
) -> Result<Json<ScheduleView>> {
    Ok(Json(ctx.schedules.update(&user.id, &id, req).await?.into()))
}

async fn remove(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<NoContentResponse> {
    ctx.schedules.delete(&user.id, &id).await?;
    Ok(NoContentResponse)
}
