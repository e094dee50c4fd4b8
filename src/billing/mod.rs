//! Billing: plans, entitlements and Stripe webhook sync.
//!
//! There is no Stripe API client; subscription state arrives exclusively
//! through signed webhooks and is cached in a [`BillingStore`].
//!
//! ```rust,ignore
//! let manager = EntitlementsManager::new(store.clone(), plans.clone());
//! manager.require_feature(&user.id, features::EXPENSE_SUMMARY).await?;
//! ```

mod entitlements;
mod error;
pub mod plans;
mod routes;
mod store;
mod webhook;

pub use entitlements::{Entitlements, EntitlementsManager};
pub use error::BillingError;
pub use plans::{LimitCheckResult, PlanConfig, PlanLimits, Plans, features, limits};
pub use routes::BillingModule;
pub use store::{BillingStore, InMemoryBillingStore, StoredSubscription, SubscriptionStatus};
pub use webhook::{WebhookEvent, WebhookHandler, WebhookOutcome, sign_payload};

use secrecy::{ExposeSecret, SecretString};

use crate::error::{OsikatuError, Result};
use crate::utils::{get_env_parsed, get_env_with_prefix};

/// Stripe settings. The webhook secret is never logged or serialized.
#[derive(Debug)]
pub struct BillingConfig {
    /// `whsec_...`; webhooks answer 503 while empty.
    pub webhook_secret: SecretString,
    pub premium_price_id: Option<String>,
    pub plus_price_id: Option<String>,
    pub signature_tolerance_seconds: i64,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            webhook_secret: SecretString::from(String::new()),
            premium_price_id: None,
            plus_price_id: None,
            signature_tolerance_seconds: 300,
        }
    }
}

impl BillingConfig {
    /// Reads `STRIPE_WEBHOOK_SECRET`, `STRIPE_PREMIUM_PRICE_ID`,
    /// `STRIPE_PLUS_PRICE_ID` and `STRIPE_SIGNATURE_TOLERANCE_SECONDS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(secret) = get_env_with_prefix("STRIPE_WEBHOOK_SECRET") {
            config.webhook_secret = SecretString::from(secret);
        }
        config.premium_price_id = get_env_with_prefix("STRIPE_PREMIUM_PRICE_ID");
        config.plus_price_id = get_env_with_prefix("STRIPE_PLUS_PRICE_ID");
        if let Some(tolerance) = get_env_parsed("STRIPE_SIGNATURE_TOLERANCE_SECONDS") {
            config.signature_tolerance_seconds = tolerance;
        }

        config
    }

    pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.webhook_secret = SecretString::from(secret.into());
        self
    }

    pub fn with_price_ids(
        mut self,
        premium: impl Into<String>,
        plus: impl Into<String>,
    ) -> Self {
        self.premium_price_id = Some(premium.into());
        self.plus_price_id = Some(plus.into());
        self
    }

    pub fn webhooks_enabled(&self) -> bool {
        !self.webhook_secret.expose_secret().is_empty()
    }

    /// The plan catalogue wired to the configured price ids.
    pub fn plans(&self) -> Plans {
        Plans::standard(self.premium_price_id.clone(), self.plus_price_id.clone())
    }

    pub fn validate(&self) -> Result<()> {
        if self.signature_tolerance_seconds <= 0 {
            return Err(OsikatuError::bad_request(
                "Webhook signature tolerance must be greater than 0",
            ));
        }
        if self.premium_price_id.is_some() && self.premium_price_id == self.plus_price_id {
            return Err(OsikatuError::bad_request(
                "Premium and plus plans must use different Stripe prices",
            ));
        }
        Ok(())
    }
}
