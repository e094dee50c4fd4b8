use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, patch, post},
};

use super::{
    ChangeRoleRequest, CircleView, CreateCircleRequest, JoinCircleRequest, MemberView,
    UpdateCircleRequest,
};
use crate::app::AppContext;
use crate::auth::AuthUser;
use crate::error::Result;
use crate::http::{CreatedResponse, NoContentResponse, RouteModule};
use crate::validation::ValidatedJson;

pub struct CircleModule;

impl RouteModule for CircleModule {
    fn routes(&self) -> Router<AppContext> {
        Router::new()
            .route("/", get(list_circles).post(create_circle))
            .route("/join", post(join_circle))
            .route(
                "/{id}",
                get(show_circle).patch(update_circle).delete(delete_circle),
            )
            .route("/{id}/leave", post(leave_circle))
            .route("/{id}/members", get(list_members))
            .route(
                "/{id}/members/{user_id}",
                patch(change_role).delete(remove_member),
            )
            .route("/{id}/invite-code", post(regenerate_invite_code))
    }

    fn prefix(&self) -> Option<&str> {
        Some("/circles")
    }
}

async fn list_circles(user: AuthUser, State(ctx): State<AppContext>) -> Result<Json<Vec<CircleView>>> {
    Ok(Json(ctx.circles.list_mine(&user.id).await?))
}

async fn create_circle(
    user: AuthUser,
    State(ctx): State<AppContext>,
    ValidatedJson(req): ValidatedJson<CreateCircleRequest>,
) -> Result<CreatedResponse<CircleView>> {
    let circle = ctx.circles.create(&user.id, req).await?;
    let location = format!("/api/circles/{}", circle.id);
    Ok(CreatedResponse::new(circle, location))
}

async fn join_circle(
    user: AuthUser,
    State(ctx): State<AppContext>,
    ValidatedJson(req): ValidatedJson<JoinCircleRequest>,
) -> Result<Json<CircleView>> {
    Ok(Json(ctx.circles.join(&user.id, &req.invite_code).await?))
}

async fn show_circle(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<CircleView>> {
    Ok(Json(ctx.circles.get(&user.id, &id).await?))
}

async fn update_circle(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateCircleRequest>,
) -> Result<Json<CircleView>> {
    Ok(Json(ctx.circles.update(&user.id, &id, req).await?))
}

async fn delete_circle(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<NoContentResponse> {
    ctx.circles.delete(&user.id, &id).await?;
    Ok(NoContentResponse)
}

async fn leave_circle(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<NoContentResponse> {
    ctx.circles.leave(&user.id, &id).await?;
    Ok(NoContentResponse)
}

async fn list_members(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<Vec<MemberView>>> {
    Ok(Json(ctx.circles.members(&user.id, &id).await?))
}

async fn change_role(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Path((id, user_id)): Path<(String, String)>,
    ValidatedJson(req): ValidatedJson<ChangeRoleRequest>,
) -> Result<NoContentResponse> {
    ctx.circles
        .change_role(&user.id, &id, &user_id, req.role)
        .await?;
    Ok(NoContentResponse)
}

async fn remove_member(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Path((id, user_id)): Path<(String, String)>,
) -> Result<NoContentResponse> {
    ctx.circles.remove_member(&user.id, &id, &user_id).await?;
    Ok(NoContentResponse)
}

async fn regenerate_invite_code(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<CircleView>> {
    Ok(Json(ctx.circles.regenerate_invite_code(&user.id, &id).await?))
}
