//! Testing utilities for the Osikatu API
//!
//! - [`TestApp`]: the full router over in-memory stores, with helpers to
//!   register users, grant points and switch plans
//! - [`Scenario`]: Alba-style requests with fluent assertions
//!
//! ```rust,ignore
//! use osikatu::testing::{self, TestApp};
//!
//! #[tokio::test]
//! async fn test_me() {
//!     let app = TestApp::new();
//!     let alice = app.register("Alice").await;
//!
//!     testing::get(app.router(), "/api/me")
//!         .bearer_token(&alice.token)
//!         .execute()
//!         .await
//!         .assert_ok();
//! }
//! ```

mod fixtures;
mod scenario;

pub use fixtures::{
    TEST_JWT_SECRET, TEST_PLUS_PRICE, TEST_PREMIUM_PRICE, TEST_WEBHOOK_SECRET, TestApp, TestUser,
    fake,
};
pub use scenario::{Scenario, ScenarioAssert, delete, get, patch, post, put};
