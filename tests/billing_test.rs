use osikatu::billing::sign_payload;
use osikatu::testing::{self, TEST_PREMIUM_PRICE, TEST_WEBHOOK_SECRET, TestApp};
use serde_json::{Value, json};

async fn send_event(app: &TestApp, event: &Value) -> testing::ScenarioAssert {
    let payload = serde_json::to_vec(event).unwrap();
    let signature =
        sign_payload(TEST_WEBHOOK_SECRET, chrono::Utc::now().timestamp(), &payload).unwrap();

    testing::post(app.router(), "/api/billing/webhook")
        .header("stripe-signature", &signature)
        .header("content-type", "application/json")
        .raw_body(payload)
        .execute()
        .await
}

fn subscription_event(id: &str, event_type: &str, created: i64, status: &str) -> Value {
    json!({
        "id": id,
        "type": event_type,
        "created": created,
        "data": { "object": {
            "id": "sub_123",
            "customer": "cus_123",
            "status": status,
            "cancel_at_period_end": false,
            "current_period_end": 1_900_000_000,
            "items": { "data": [{ "price": { "id": TEST_PREMIUM_PRICE } }] },
        }},
    })
}

#[tokio::test]
async fn test_plans_are_public() {
    let app = TestApp::new();

    let plans: Value = testing::get(app.router(), "/api/billing/plans")
        .execute()
        .await
        .assert_ok()
        .json()
        .await;
    let ids: Vec<&str> = plans
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["free", "premium", "plus"]);
}

#[tokio::test]
async fn test_checkout_and_subscription_upgrade_the_user() {
    let app = TestApp::new();
    let alice = app.register("Alice").await;

    let checkout = json!({
        "id": "evt_1",
        "type": "checkout.session.completed",
        "created": 100,
        "data": { "object": {
            "customer": "cus_123",
            "client_reference_id": alice.id,
            "subscription": "sub_123",
        }},
    });
    let outcome = send_event(&app, &checkout).await.assert_ok().json_at("outcome").await;
    assert_eq!(outcome, "processed");

    send_event(&app, &subscription_event("evt_2", "customer.subscription.created", 200, "active"))
        .await
        .assert_ok();

    let entitlements: Value = testing::get(app.router(), "/api/billing/entitlements")
        .bearer_token(&alice.token)
        .execute()
        .await
        .assert_ok()
        .json()
        .await;
    assert_eq!(entitlements["plan_id"], "premium");
    assert_eq!(entitlements["subscription_status"], "active");
    assert!(
        entitlements["features"]
            .as_array()
            .unwrap()
            .contains(&json!("expense_summary"))
    );

    // The same event again changes nothing.
    let outcome = send_event(&app, &subscription_event("evt_2", "customer.subscription.created", 200, "active"))
        .await
        .assert_ok()
        .json_at("outcome")
        .await;
    assert_eq!(outcome, "already_processed");

    send_event(&app, &subscription_event("evt_3", "customer.subscription.deleted", 300, "canceled"))
        .await
        .assert_ok();

    let plan = testing::get(app.router(), "/api/me")
        .bearer_token(&alice.token)
        .execute()
        .await
        .json_at("plan_id")
        .await;
    assert_eq!(plan, "free");
}

#[tokio::test]
async fn test_webhook_rejects_bad_signatures() {
    let app = TestApp::new();
    let payload = br#"{"id":"evt_1","type":"ping","created":1,"data":{"object":{}}}"#.to_vec();

    testing::post(app.router(), "/api/billing/webhook")
        .raw_body(payload.clone())
        .execute()
        .await
        .assert_bad_request();

    let signature = sign_payload("whsec_someone_else", chrono::Utc::now().timestamp(), &payload).unwrap();
    testing::post(app.router(), "/api/billing/webhook")
        .header("stripe-signature", &signature)
        .raw_body(payload.clone())
        .execute()
        .await
        .assert_bad_request();

    let stale = sign_payload(TEST_WEBHOOK_SECRET, chrono::Utc::now().timestamp() - 3600, &payload).unwrap();
    testing::post(app.router(), "/api/billing/webhook")
        .header("stripe-signature", &stale)
        .raw_body(payload)
        .execute()
        .await
        .assert_bad_request();
}

#[tokio::test]
async fn test_webhook_without_secret_is_unavailable() {
    let config = osikatu::ConfigBuilder::new()
        .with_jwt_secret(osikatu::testing::TEST_JWT_SECRET)
        .build()
        .unwrap();
    let app = TestApp::with_config(config);
    let payload = br#"{"id":"evt_1","type":"ping","created":1,"data":{"object":{}}}"#.to_vec();
    let signature = sign_payload(TEST_WEBHOOK_SECRET, chrono::Utc::now().timestamp(), &payload).unwrap();

    let response = testing::post(app.router(), "/api/billing/webhook")
        .header("stripe-signature", &signature)
        .raw_body(payload)
        .execute()
        .await;
    assert_eq!(response.status(), axum::http::StatusCode::SERVICE_UNAVAILABLE);
}
