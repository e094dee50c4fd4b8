use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::app::AppContext;
use crate::billing::WebhookHandler;

/// Health check status
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Health check result for a single component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ComponentHealth {
    fn new(name: &str, status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: Some(message.into()),
        }
    }
}

/// Overall health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub checks: Vec<ComponentHealth>,
}

impl IntoResponse for HealthResponse {
    fn into_response(self) -> Response {
        let status_code = match self.status {
            HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
            HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        };

        (status_code, Json(self)).into_response()
    }
}

#[async_trait]
pub trait HealthCheck: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self) -> ComponentHealth;
}

/// Always healthy while the process answers requests
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplicationCheck;

#[async_trait]
impl HealthCheck for ApplicationCheck {
    fn name(&self) -> &str {
        "application"
    }

    async fn check(&self) -> ComponentHealth {
        ComponentHealth::new(self.name(), HealthStatus::Healthy, "Application is running")
    }
}

/// Degraded while Stripe webhooks cannot be verified.
pub struct BillingWebhookCheck {
    webhooks: Arc<WebhookHandler>,
}

impl BillingWebhookCheck {
    pub fn new(webhooks: Arc<WebhookHandler>) -> Self {
        Self { webhooks }
    }
}

#[async_trait]
impl HealthCheck for BillingWebhookCheck {
    fn name(&self) -> &str {
        "billing_webhooks"
    }

    async fn check(&self) -> ComponentHealth {
        if self.webhooks.is_configured() {
            ComponentHealth::new(self.name(), HealthStatus::Healthy, "Webhook secret configured")
        } else {
            ComponentHealth::new(
                self.name(),
                HealthStatus::Degraded,
                "No webhook secret; subscription changes are not received",
            )
        }
    }
}

/// Runs all registered checks; the worst status wins.
pub struct HealthChecker {
    checks: Vec<Arc<dyn HealthCheck>>,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self {
            checks: vec![Arc::new(ApplicationCheck)],
        }
    }

    pub fn with_check(mut self, check: Arc<dyn HealthCheck>) -> Self {
        self.checks.push(check);
        self
    }

    pub async fn check_health(&self) -> HealthResponse {
        let mut checks = Vec::new();
        let mut overall_status = HealthStatus::Healthy;

        for check in &self.checks {
            let result = check.check().await;

            match result.status {
                HealthStatus::Unhealthy => overall_status = HealthStatus::Unhealthy,
                HealthStatus::Degraded if overall_status == HealthStatus::Healthy => {
                    overall_status = HealthStatus::Degraded
                }
                _ => {}
            }

            checks.push(result);
        }

        HealthResponse {
            status: overall_status,
            checks,
        }
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

/// `GET /health`
pub async fn health_handler(State(ctx): State<AppContext>) -> HealthResponse {
    HealthChecker::new()
        .with_check(Arc::new(BillingWebhookCheck::new(ctx.webhooks.clone())))
        .check_health()
        .await
}
