use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{Contribution, LedgerEntry};
use crate::app::AppContext;
use crate::auth::AuthUser;
use crate::error::Result;
use crate::http::{PaginatedData, PaginationQuery, RouteModule};
use crate::validation::{ValidatedJson, validate_not_blank};

const MAX_AMOUNT: i64 = 1_000_000;

#[derive(Debug, Serialize)]
struct BalanceResponse {
    balance: i64,
}

#[derive(Debug, Serialize)]
struct DailyBonusResponse {
    granted: bool,
    entry: LedgerEntry,
    balance: i64,
}

pub struct PointsModule;

impl RouteModule for PointsModule {
    fn routes(&self) -> Router<AppContext> {
        Router::new()
            .route("/", get(balance))
            .route("/history", get(history))
            .route("/daily-bonus", post(daily_bonus))
    }

    fn prefix(&self) -> Option<&str> {
        Some("/points")
    }
}

async fn balance(user: AuthUser, State(ctx): State<AppContext>) -> Result<Json<BalanceResponse>> {
    let balance = ctx.points.balance(&user.id).await?;
    Ok(Json(BalanceResponse { balance }))
}

async fn history(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Query(page): Query<PaginationQuery>,
) -> Result<PaginatedData<LedgerEntry>> {
    ctx.points.history(&user.id, &page).await
}

async fn daily_bonus(user: AuthUser, State(ctx): State<AppContext>) -> Result<Json<DailyBonusResponse>> {
    let today = crate::utils::now().date_naive();
    let outcome = ctx.points.claim_daily_bonus(&user.id, today).await?;
    let balance = ctx.points.balance(&user.id).await?;

    Ok(Json(DailyBonusResponse {
        granted: outcome.created,
        entry: outcome.entry,
        balance,
    }))
}

/// Circle balances. Paths are absolute because they hang off `/circles/{id}`.
pub struct CirclePointsModule;

impl RouteModule for CirclePointsModule {
    fn routes(&self) -> Router<AppContext> {
        Router::new()
            .route("/circles/{id}/points", get(circle_balance))
            .route("/circles/{id}/points/history", get(circle_history))
            .route("/circles/{id}/points/contribute", post(contribute))
            .route("/circles/{id}/points/add", post(circle_add))
            .route("/circles/{id}/points/deduct", post(circle_deduct))
    }
}

#[derive(Debug, Deserialize, Validate)]
struct ContributeRequest {
    #[validate(range(min = 1, max = MAX_AMOUNT))]
    amount: i64,
}

#[derive(Debug, Deserialize, Validate)]
struct AdjustRequest {
    #[validate(range(min = 1, max = MAX_AMOUNT))]
    amount: i64,
    #[validate(length(min = 1, max = 100), custom(function = "validate_not_blank"))]
    reason: String,
}

async fn circle_balance(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<BalanceResponse>> {
    let balance = ctx.circle_points.balance(&id, &user.id).await?;
    Ok(Json(BalanceResponse { balance }))
}

async fn circle_history(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    Query(page): Query<PaginationQuery>,
) -> Result<PaginatedData<LedgerEntry>> {
    ctx.circle_points.history(&id, &user.id, &page).await
}

async fn contribute(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<ContributeRequest>,
) -> Result<Json<Contribution>> {
    Ok(Json(ctx.circle_points.contribute(&id, &user.id, req.amount).await?))
}

async fn circle_add(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<AdjustRequest>,
) -> Result<Json<LedgerEntry>> {
    Ok(Json(
        ctx.circle_points
            .add(&id, &user.id, req.amount, req.reason.trim())
            .await?,
    ))
}

async fn circle_deduct(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<AdjustRequest>,
) -> Result<Json<LedgerEntry>> {
    Ok(Json(
        ctx.circle_points
            .deduct(&id, &user.id, req.amount, req.reason.trim())
            .await?,
    ))
}
