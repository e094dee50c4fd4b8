//! Entitlements and feature gating.
//!
//! A user's entitlements are the plan of their active subscription, or the
//! free plan when they have none (or it lapsed).

use std::sync::Arc;

use serde::Serialize;

use super::error::BillingError;
use super::plans::{LimitCheckResult, PlanConfig, PlanLimits, Plans};
use super::store::{BillingStore, StoredSubscription, SubscriptionStatus};
use crate::error::Result;

/// Resolves plans for users and enforces feature/limit gates.
pub struct EntitlementsManager {
    store: Arc<dyn BillingStore>,
    plans: Plans,
}

impl EntitlementsManager {
    #[must_use]
    pub fn new(store: Arc<dyn BillingStore>, plans: Plans) -> Self {
        Self { store, plans }
    }

    pub fn plans(&self) -> &Plans {
        &self.plans
    }

    pub async fn for_user(&self, user_id: &str) -> Result<Entitlements> {
        let subscription = self.store.get_subscription(user_id).await?;
        Ok(Entitlements::resolve(&self.plans, subscription.as_ref()))
    }

    pub async fn plan_id(&self, user_id: &str) -> Result<String> {
        Ok(self.for_user(user_id).await?.plan_id)
    }

    pub async fn has_feature(&self, user_id: &str, feature: &str) -> Result<bool> {
        Ok(self.for_user(user_id).await?.has_feature(feature))
    }

    pub async fn check_limit(
        &self,
        user_id: &str,
        limit: &str,
        current: u64,
    ) -> Result<LimitCheckResult> {
        Ok(self.for_user(user_id).await?.check_limit(limit, current))
    }

    /// `PaymentRequired` unless the user's plan includes `feature`.
    pub async fn require_feature(&self, user_id: &str, feature: &str) -> Result<()> {
        self.for_user(user_id).await?.require_feature(feature)
    }

    /// `PaymentRequired` when `current` already reached the plan's `limit`.
    pub async fn require_limit(&self, user_id: &str, limit: &str, current: u64) -> Result<()> {
        self.for_user(user_id).await?.require_limit(limit, current)
    }
}

/// What a user may do right now.
#[derive(Debug, Clone, Serialize)]
pub struct Entitlements {
    pub plan_id: String,
    pub display_name: String,
    /// Status of the stored subscription, even when it no longer grants the plan.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_status: Option<SubscriptionStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_period_end: Option<chrono::DateTime<chrono::Utc>>,
    pub cancel_at_period_end: bool,
    pub features: Vec<String>,
    pub limits: PlanLimits,
}

impl Entitlements {
    fn resolve(plans: &Plans, subscription: Option<&StoredSubscription>) -> Self {
        let granted = subscription
            .filter(|s| s.is_active())
            .and_then(|s| plans.get(&s.plan_id).cloned());
        let plan = granted.unwrap_or_else(|| plans.free());

        Self::from_plan(&plan, subscription)
    }

    fn from_plan(plan: &PlanConfig, subscription: Option<&StoredSubscription>) -> Self {
        Self {
            plan_id: plan.id.clone(),
            display_name: plan.display_name.clone(),
            subscription_status: subscription.map(|s| s.status),
            current_period_end: subscription.and_then(|s| s.current_period_end),
            cancel_at_period_end: subscription.is_some_and(|s| s.cancel_at_period_end),
            features: plan.features.iter().cloned().collect(),
            limits: plan.limits.clone(),
        }
    }

    #[must_use]
    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }

    #[must_use]
    pub fn check_limit(&self, limit: &str, current: u64) -> LimitCheckResult {
        self.limits.check(limit, current)
    }

    pub fn require_feature(&self, feature: &str) -> Result<()> {
        if self.has_feature(feature) {
            return Ok(());
        }
        Err(BillingError::FeatureNotIncluded {
            feature: feature.to_string(),
            plan_id: self.plan_id.clone(),
        }
        .into())
    }

    pub fn require_limit(&self, limit: &str, current: u64) -> Result<()> {
        match self.check_limit(limit, current) {
            LimitCheckResult::AtLimit { max, .. } => Err(BillingError::LimitReached {
                limit: limit.to_string(),
                plan_id: self.plan_id.clone(),
                max,
            }
            .into()),
            _ => Ok(()),
        }
    }
}
