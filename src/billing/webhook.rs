//! Stripe webhook handling.
//!
//! Verifies the `Stripe-Signature` header, then syncs subscription state.
//! Each event id is processed at most once.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, info, instrument, warn};

use super::error::BillingError;
use super::plans::Plans;
use super::store::{BillingStore, StoredSubscription, SubscriptionStatus};
use crate::error::{OsikatuError, Result};
use crate::oplog::{NewOperation, OperationLogger};

/// A Stripe event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
    pub created: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    pub object: Value,
}

/// What happened to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    Processed,
    Ignored,
    AlreadyProcessed,
}

/// Verifies and applies Stripe webhook events.
///
/// The signing secret is held in a [`SecretString`] and never logged.
pub struct WebhookHandler {
    store: Arc<dyn BillingStore>,
    webhook_secret: SecretString,
    tolerance_seconds: i64,
    plans: Plans,
    oplog: Arc<OperationLogger>,
}

impl WebhookHandler {
    pub fn new(
        store: Arc<dyn BillingStore>,
        webhook_secret: SecretString,
        tolerance_seconds: i64,
        plans: Plans,
        oplog: Arc<OperationLogger>,
    ) -> Self {
        Self {
            store,
            webhook_secret,
            tolerance_seconds,
            plans,
            oplog,
        }
    }

    /// `false` while no webhook secret is set; every webhook is then refused.
    pub fn is_configured(&self) -> bool {
        !self.webhook_secret.expose_secret().is_empty()
    }

    /// Verify `signature` against the raw body and parse the event.
    pub fn verify_signature(&self, payload: &[u8], signature: &str) -> Result<WebhookEvent> {
        self.verify_signature_at(payload, signature, Utc::now().timestamp())
    }

    pub(crate) fn verify_signature_at(
        &self,
        payload: &[u8],
        signature: &str,
        now: i64,
    ) -> Result<WebhookEvent> {
        let secret = self.webhook_secret.expose_secret();
        if secret.is_empty() {
            return Err(BillingError::NotConfigured.into());
        }

        let parts = parse_signature_header(signature)?;

        let within_tolerance = now
            .checked_sub(parts.timestamp)
            .map(i64::unsigned_abs)
            .is_some_and(|skew| skew <= self.tolerance_seconds.unsigned_abs());
        if !within_tolerance {
            return Err(invalid_signature("timestamp outside tolerance"));
        }

        let mut signed_payload = format!("{}.", parts.timestamp).into_bytes();
        signed_payload.extend_from_slice(payload);
        let expected = compute_signature(secret, &signed_payload)?;

        // Any v1 entry may match; Stripe sends several while a secret rolls.
        let matched = parts.signatures.iter().any(|candidate| {
            hex::decode(candidate)
                .map(|provided| expected.ct_eq(&provided).unwrap_u8() == 1)
                .unwrap_or(false)
        });
        if !matched {
            return Err(invalid_signature("signature mismatch"));
        }

        serde_json::from_slice(payload).map_err(|e| {
            warn!(error = %e, "Failed to parse webhook payload");
            BillingError::InvalidWebhookPayload {
                message: "malformed JSON payload".to_string(),
            }
            .into()
        })
    }

    /// Apply a verified event once.
    #[instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type))]
    pub async fn handle_event(&self, event: WebhookEvent) -> Result<WebhookOutcome> {
        if self.store.is_event_processed(&event.id).await? {
            debug!("Webhook event already processed");
            return Ok(WebhookOutcome::AlreadyProcessed);
        }

        let outcome = match event.event_type.as_str() {
            "checkout.session.completed" => self.handle_checkout_completed(&event).await?,
            "customer.subscription.created" | "customer.subscription.updated" => {
                self.handle_subscription_updated(&event).await?
            }
            "customer.subscription.deleted" => self.handle_subscription_deleted(&event).await?,
            "invoice.payment_failed" => self.handle_payment_failed(&event).await?,
            _ => WebhookOutcome::Ignored,
        };

        if outcome != WebhookOutcome::Ignored {
            self.store.mark_event_processed(&event.id).await?;
        }

        Ok(outcome)
    }

    async fn handle_checkout_completed(&self, event: &WebhookEvent) -> Result<WebhookOutcome> {
        let session = &event.data.object;
        let customer = str_field(session, "customer");
        let user_id = str_field(session, "client_reference_id");

        let (Some(customer), Some(user_id)) = (customer, user_id) else {
            debug!("Checkout session without customer or client reference");
            return Ok(WebhookOutcome::Ignored);
        };

        self.store.link_customer(customer, user_id).await?;
        info!(user_id, customer, "Stripe customer linked");
        Ok(WebhookOutcome::Processed)
    }

    async fn handle_subscription_updated(&self, event: &WebhookEvent) -> Result<WebhookOutcome> {
        let object = &event.data.object;
        let subscription_id = required_str(object, "id")?;
        let customer_id = required_str(object, "customer")?;

        let user_id = match object.pointer("/metadata/user_id").and_then(Value::as_str) {
            Some(user_id) => {
                self.store.link_customer(customer_id, user_id).await?;
                user_id.to_string()
            }
            None => self
                .store
                .user_for_customer(customer_id)
                .await?
                .ok_or_else(|| BillingError::UnknownCustomer {
                    customer_id: customer_id.to_string(),
                })?,
        };

        let price_id = object
            .pointer("/items/data/0/price/id")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid_payload("subscription has no price"))?;
        let Some(plan) = self.plans.find_by_stripe_price(price_id) else {
            warn!(price_id, "Subscription for unknown price ignored");
            return Ok(WebhookOutcome::Ignored);
        };

        let stale = self
            .store
            .get_subscription(&user_id)
            .await?
            .is_some_and(|existing| {
                existing.stripe_subscription_id == subscription_id
                    && existing.synced_event_at > event.created
            });
        if stale {
            debug!(user_id, "Stale subscription event ignored");
            return Ok(WebhookOutcome::Ignored);
        }

        let status = SubscriptionStatus::from_stripe(str_field(object, "status").unwrap_or(""));
        let period_end = object
            .get("current_period_end")
            .or_else(|| object.pointer("/items/data/0/current_period_end"))
            .and_then(Value::as_i64)
            .and_then(|ts| DateTime::from_timestamp(ts, 0));

        let subscription = StoredSubscription {
            user_id: user_id.clone(),
            stripe_subscription_id: subscription_id.to_string(),
            stripe_customer_id: customer_id.to_string(),
            plan_id: plan.id.clone(),
            status,
            current_period_end: period_end,
            cancel_at_period_end: object
                .get("cancel_at_period_end")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            synced_event_at: event.created,
            updated_at: Utc::now(),
        };
        self.store.save_subscription(subscription).await?;

        info!(user_id, plan_id = %plan.id, status = status.as_str(), "Subscription synced");
        self.record_sync(&user_id, subscription_id, &plan.id, status)
            .await;
        Ok(WebhookOutcome::Processed)
    }

    async fn handle_subscription_deleted(&self, event: &WebhookEvent) -> Result<WebhookOutcome> {
        let subscription_id = required_str(&event.data.object, "id")?;

        if let Some(removed) = self.store.delete_subscription(subscription_id).await? {
            info!(user_id = %removed.user_id, "Subscription removed");
            self.record_sync(
                &removed.user_id,
                subscription_id,
                &removed.plan_id,
                SubscriptionStatus::Canceled,
            )
            .await;
        }
        Ok(WebhookOutcome::Processed)
    }

    async fn handle_payment_failed(&self, event: &WebhookEvent) -> Result<WebhookOutcome> {
        let Some(subscription_id) = str_field(&event.data.object, "subscription") else {
            return Ok(WebhookOutcome::Ignored);
        };
        let Some(mut subscription) = self
            .store
            .get_subscription_by_stripe_id(subscription_id)
            .await?
        else {
            debug!(subscription_id, "Payment failure for unknown subscription");
            return Ok(WebhookOutcome::Ignored);
        };

        subscription.status = SubscriptionStatus::PastDue;
        subscription.updated_at = Utc::now();
        let user_id = subscription.user_id.clone();
        let plan_id = subscription.plan_id.clone();
        self.store.save_subscription(subscription).await?;

        warn!(user_id, subscription_id, "Subscription payment failed");
        self.record_sync(&user_id, subscription_id, &plan_id, SubscriptionStatus::PastDue)
            .await;
        Ok(WebhookOutcome::Processed)
    }

    async fn record_sync(
        &self,
        user_id: &str,
        subscription_id: &str,
        plan_id: &str,
        status: SubscriptionStatus,
    ) {
        self.oplog
            .record(
                NewOperation::new("billing.subscription_sync")
                    .actor(user_id)
                    .target("subscription", subscription_id)
                    .metadata(json!({ "plan_id": plan_id, "status": status.as_str() })),
            )
            .await;
    }
}

struct SignatureParts {
    timestamp: i64,
    signatures: Vec<String>,
}

/// Parse `t=<unix>,v1=<hex>[,v1=<hex>...]`; other schemes are skipped.
fn parse_signature_header(header: &str) -> Result<SignatureParts> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let (key, value) = part
            .split_once('=')
            .ok_or_else(|| invalid_signature("malformed header"))?;

        match key.trim() {
            "t" => timestamp = value.trim().parse().ok(),
            "v1" => signatures.push(value.trim().to_string()),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| invalid_signature("missing timestamp"))?;
    if signatures.is_empty() {
        return Err(invalid_signature("missing v1 signature"));
    }

    Ok(SignatureParts {
        timestamp,
        signatures,
    })
}

fn compute_signature(secret: &str, payload: &[u8]) -> Result<Vec<u8>> {
    type HmacSha256 = Hmac<Sha256>;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| OsikatuError::internal("HMAC error"))?;
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Header value for `payload` signed at `timestamp`. Used by tests and tooling.
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> Result<String> {
    let mut signed_payload = format!("{}.", timestamp).into_bytes();
    signed_payload.extend_from_slice(payload);
    let signature = compute_signature(secret, &signed_payload)?;
    Ok(format!("t={},v1={}", timestamp, hex::encode(signature)))
}

fn str_field<'a>(object: &'a Value, key: &str) -> Option<&'a str> {
    object.get(key).and_then(Value::as_str)
}

fn required_str<'a>(object: &'a Value, key: &str) -> Result<&'a str> {
    str_field(object, key).ok_or_else(|| invalid_payload(&format!("missing {}", key)))
}

fn invalid_signature(reason: &str) -> OsikatuError {
    BillingError::InvalidSignature {
        reason: reason.to_string(),
    }
    .into()
}

fn invalid_payload(message: &str) -> OsikatuError {
    BillingError::InvalidWebhookPayload {
        message: message.to_string(),
    }
    .into()
}
