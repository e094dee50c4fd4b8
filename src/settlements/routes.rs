use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};

use super::{
    Balance, CreateSettlementRequest, RecordTransferRequest, Settlement, Suggestion, Transfer,
};
use crate::app::AppContext;
use crate::auth::AuthUser;
use crate::error::Result;
use crate::http::{CreatedResponse, NoContentResponse, RouteModule};
use crate::validation::ValidatedJson;

/// Bill splitting under `/circles/{id}/settlements`
pub struct SettlementModule;

impl RouteModule for SettlementModule {
    fn routes(&self) -> Router<AppContext> {
        Router::new()
            .route("/circles/{id}/settlements", get(list).post(create))
            .route("/circles/{id}/settlements/balances", get(balances))
            .route("/circles/{id}/settlements/suggestions", get(suggestions))
            .route(
                "/circles/{id}/settlements/transfers",
                get(list_transfers).post(record_transfer),
            )
            .route(
                "/circles/{id}/settlements/{settlement_id}",
                get(show).delete(remove),
            )
    }
}

async fn list(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Settlement>>> {
    Ok(Json(ctx.settlements.list(&id, &user.id).await?))
}

async fn create(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<CreateSettlementRequest>,
) -> Result<CreatedResponse<Settlement>> {
    let settlement = ctx.settlements.create(&id, &user.id, req).await?;
    let location = format!("/api/circles/{}/settlements/{}", id, settlement.id);
    Ok(CreatedResponse::new(settlement, location))
}

async fn show(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Path((id, settlement_id)): Path<(String, String)>,
) -> Result<Json<Settlement>> {
    Ok(Json(ctx.settlements.get(&id, &user.id, &settlement_id).await?))
}

async fn remove(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Path((id, settlement_id)): Path<(String, String)>,
) -> Result<NoContentResponse> {
    ctx.settlements.delete(&id, &user.id, &settlement_id).await?;
    Ok(NoContentResponse)
}

async fn balances(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Balance>>> {
    Ok(Json(ctx.settlements.balances(&id, &user.id).await?))
}

async fn suggestions(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Suggestion>>> {
    Ok(Json(ctx.settlements.suggestions(&id, &user.id).await?))
}

async fn list_transfers(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Transfer>>> {
    Ok(Json(ctx.settlements.list_transfers(&id, &user.id).await?))
}

async fn record_transfer(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<RecordTransferRequest>,
) -> Result<CreatedResponse<Transfer>> {
    let transfer = ctx.settlements.record_transfer(&id, &user.id, req).await?;
    let location = format!("/api/circles/{}/settlements/transfers", id);
    Ok(CreatedResponse::new(transfer, location))
}
