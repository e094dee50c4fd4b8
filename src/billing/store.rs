//! Subscription storage.
//!
//! Subscription state is synced from Stripe webhooks so that entitlement
//! checks never call out to Stripe.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::Result;

/// Stripe subscription status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
    Incomplete,
    IncompleteExpired,
    Paused,
    Unpaid,
}

impl SubscriptionStatus {
    /// Parse a Stripe status string. Unknown values map to `Incomplete`.
    #[must_use]
    pub fn from_stripe(status: &str) -> Self {
        match status {
            "active" => Self::Active,
            "trialing" => Self::Trialing,
            "past_due" => Self::PastDue,
            "canceled" => Self::Canceled,
            "incomplete_expired" => Self::IncompleteExpired,
            "paused" => Self::Paused,
            "unpaid" => Self::Unpaid,
            _ => Self::Incomplete,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Trialing => "trialing",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
            Self::Incomplete => "incomplete",
            Self::IncompleteExpired => "incomplete_expired",
            Self::Paused => "paused",
            Self::Unpaid => "unpaid",
        }
    }

    /// Whether this status grants the plan's entitlements.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active | Self::Trialing)
    }
}

/// Cached subscription state for one user.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StoredSubscription {
    pub user_id: String,
    pub stripe_subscription_id: String,
    pub stripe_customer_id: String,
    pub plan_id: String,
    pub status: SubscriptionStatus,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    /// `created` timestamp of the Stripe event this state came from.
    #[serde(skip)]
    pub synced_event_at: i64,
    pub updated_at: DateTime<Utc>,
}

impl StoredSubscription {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

#[async_trait]
pub trait BillingStore: Send + Sync {
    async fn link_customer(&self, customer_id: &str, user_id: &str) -> Result<()>;

    async fn user_for_customer(&self, customer_id: &str) -> Result<Option<String>>;

    async fn get_subscription(&self, user_id: &str) -> Result<Option<StoredSubscription>>;

    async fn get_subscription_by_stripe_id(
        &self,
        stripe_subscription_id: &str,
    ) -> Result<Option<StoredSubscription>>;

    /// Insert or replace the subscription of `subscription.user_id`.
    async fn save_subscription(&self, subscription: StoredSubscription) -> Result<()>;

    /// Remove by Stripe id, returning what was removed.
    async fn delete_subscription(
        &self,
        stripe_subscription_id: &str,
    ) -> Result<Option<StoredSubscription>>;

    async fn is_event_processed(&self, event_id: &str) -> Result<bool>;

    async fn mark_event_processed(&self, event_id: &str) -> Result<()>;
}

#[derive(Default)]
struct BillingState {
    customers: HashMap<String, String>,
    subscriptions: HashMap<String, StoredSubscription>,
    processed_events: HashSet<String>,
}

#[derive(Clone, Default)]
pub struct InMemoryBillingStore {
    state: Arc<RwLock<BillingState>>,
}

impl InMemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BillingStore for InMemoryBillingStore {
    async fn link_customer(&self, customer_id: &str, user_id: &str) -> Result<()> {
        self.state
            .write()
            .await
            .customers
            .insert(customer_id.to_string(), user_id.to_string());
        Ok(())
    }

    async fn user_for_customer(&self, customer_id: &str) -> Result<Option<String>> {
        Ok(self.state.read().await.customers.get(customer_id).cloned())
    }

    async fn get_subscription(&self, user_id: &str) -> Result<Option<StoredSubscription>> {
        Ok(self.state.read().await.subscriptions.get(user_id).cloned())
    }

    async fn get_subscription_by_stripe_id(
        &self,
        stripe_subscription_id: &str,
    ) -> Result<Option<StoredSubscription>> {
        Ok(self
            .state
            .read()
            .await
            .subscriptions
            .values()
            .find(|s| s.stripe_subscription_id == stripe_subscription_id)
            .cloned())
    }

    async fn save_subscription(&self, subscription: StoredSubscription) -> Result<()> {
        self.state
            .write()
            .await
            .subscriptions
            .insert(subscription.user_id.clone(), subscription);
        Ok(())
    }

    async fn delete_subscription(
        &self,
        stripe_subscription_id: &str,
    ) -> Result<Option<StoredSubscription>> {
        let mut state = self.state.write().await;
        let user_id = state
            .subscriptions
            .iter()
            .find(|(_, s)| s.stripe_subscription_id == stripe_subscription_id)
            .map(|(user_id, _)| user_id.clone());

        Ok(user_id.and_then(|id| state.subscriptions.remove(&id)))
    }

    async fn is_event_processed(&self, event_id: &str) -> Result<bool> {
        Ok(self.state.read().await.processed_events.contains(event_id))
    }

    async fn mark_event_processed(&self, event_id: &str) -> Result<()> {
        self.state
            .write()
            .await
            .processed_events
            .insert(event_id.to_string());
        Ok(())
    }
}
