//! A fully wired app over in-memory stores, plus helpers for test data.

use std::sync::Arc;

use axum::Router;
use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::json;

use super::scenario;
use crate::app::AppContext;
use crate::auth::PasswordConfig;
use crate::billing::{
    BillingConfig, BillingStore, InMemoryBillingStore, StoredSubscription, SubscriptionStatus,
};
use crate::config::{Config, ConfigBuilder};
use crate::core::App;

pub const TEST_JWT_SECRET: &str = "test-secret-key-that-is-long-enough-for-hs256";
pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const TEST_PREMIUM_PRICE: &str = "price_premium_test";
pub const TEST_PLUS_PRICE: &str = "price_plus_test";

/// Generated test data
pub mod fake {
    use uuid::Uuid;

    pub fn email() -> String {
        format!("fan-{}@example.com", Uuid::new_v4().simple())
    }

    /// A gacha request id
    pub fn request_id() -> String {
        format!("req-{}", Uuid::new_v4().simple())
    }
}

/// A registered user and their access token
#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub token: String,
}

/// The whole application, ready for [`scenario`] requests
///
/// Passwords use cheap Argon2 settings and the gacha is seeded, so runs are
/// fast and reproducible.
pub struct TestApp {
    router: Router,
    context: AppContext,
    billing: Arc<InMemoryBillingStore>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(Self::config_builder().build().unwrap())
    }

    /// Test secrets and Stripe price ids, otherwise defaults.
    pub fn config_builder() -> ConfigBuilder {
        ConfigBuilder::new()
            .with_jwt_secret(TEST_JWT_SECRET)
            .with_billing(
                BillingConfig::default()
                    .with_webhook_secret(TEST_WEBHOOK_SECRET)
                    .with_price_ids(TEST_PREMIUM_PRICE, TEST_PLUS_PRICE),
            )
    }

    pub fn with_config(config: Config) -> Self {
        let billing = Arc::new(InMemoryBillingStore::new());
        let context = AppContext::builder(&config)
            .with_password_config(PasswordConfig::fast())
            .with_gacha_rng(StdRng::seed_from_u64(7))
            .with_billing_store(billing.clone())
            .build();
        let router = App::new(config, context.clone()).into_test_router();
        Self {
            router,
            context,
            billing,
        }
    }

    /// A fresh handle on the router; each request consumes one.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    /// Register through the API and return the issued token.
    pub async fn register(&self, display_name: &str) -> TestUser {
        let email = fake::email();
        let body: serde_json::Value = scenario::post(self.router(), "/api/auth/register")
            .json_body(&json!({
                "email": email,
                "password": "correct horse battery",
                "display_name": display_name,
            }))
            .execute()
            .await
            .assert_created()
            .json()
            .await;

        TestUser {
            id: body["user"]["id"].as_str().unwrap().to_string(),
            email,
            display_name: display_name.to_string(),
            token: body["access_token"].as_str().unwrap().to_string(),
        }
    }

    /// Put the user on `plan_id` as if a Stripe webhook had arrived.
    pub async fn subscribe(&self, user: &TestUser, plan_id: &str) {
        self.billing
            .save_subscription(StoredSubscription {
                user_id: user.id.clone(),
                stripe_subscription_id: format!("sub_{}", user.id),
                stripe_customer_id: format!("cus_{}", user.id),
                plan_id: plan_id.to_string(),
                status: SubscriptionStatus::Active,
                current_period_end: None,
                cancel_at_period_end: false,
                synced_event_at: 0,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    pub async fn grant_points(&self, user: &TestUser, amount: i64) {
        self.context
            .points
            .add(&user.id, amount, "test grant", None)
            .await
            .unwrap();
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}
