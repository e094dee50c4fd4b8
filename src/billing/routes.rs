use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::{get, post},
};
use serde::Serialize;
use tracing::warn;

use super::{Entitlements, PlanConfig, WebhookOutcome};
use crate::app::AppContext;
use crate::auth::AuthUser;
use crate::error::{OsikatuError, Result};
use crate::http::RouteModule;

const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

pub struct BillingModule;

impl RouteModule for BillingModule {
    fn routes(&self) -> Router<AppContext> {
        Router::new()
            .route("/plans", get(list_plans))
            .route("/entitlements", get(entitlements))
            .route("/webhook", post(webhook))
    }

    fn prefix(&self) -> Option<&str> {
        Some("/billing")
    }
}

async fn list_plans(State(ctx): State<AppContext>) -> Json<Vec<PlanConfig>> {
    Json(ctx.entitlements.plans().iter().cloned().collect())
}

async fn entitlements(user: AuthUser, State(ctx): State<AppContext>) -> Result<Json<Entitlements>> {
    Ok(Json(ctx.entitlements.for_user(&user.id).await?))
}

#[derive(Serialize)]
struct WebhookResponse {
    outcome: WebhookOutcome,
}

async fn webhook(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>> {
    let signature = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| OsikatuError::bad_request("Missing Stripe-Signature header"))?;

    let event = ctx.webhooks.verify_signature(&body, signature).inspect_err(|e| {
        warn!(error = %e, "Rejected webhook");
    })?;
    let outcome = ctx.webhooks.handle_event(event).await?;

    Ok(Json(WebhookResponse { outcome }))
}
