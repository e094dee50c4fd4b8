use osikatu::testing::{self, TestApp};
use serde_json::json;

#[tokio::test]
async fn test_register_then_me() {
    let app = TestApp::new();
    let alice = app.register("Alice").await;

    let me: serde_json::Value = testing::get(app.router(), "/api/me")
        .bearer_token(&alice.token)
        .execute()
        .await
        .assert_ok()
        .json()
        .await;

    assert_eq!(me["user"]["id"], alice.id.as_str());
    assert_eq!(me["user"]["display_name"], "Alice");
    assert_eq!(me["plan_id"], "free");
    assert_eq!(me["points_balance"], 300);
    assert!(me["user"].get("password_hash").is_none());
}

#[tokio::test]
async fn test_login_with_registered_credentials() {
    let app = TestApp::new();
    let alice = app.register("Alice").await;

    let body: serde_json::Value = testing::post(app.router(), "/api/auth/login")
        .json_body(&json!({ "email": alice.email, "password": "correct horse battery" }))
        .execute()
        .await
        .assert_ok()
        .json()
        .await;
    assert_eq!(body["user"]["id"], alice.id.as_str());
    assert_eq!(body["token_type"], "Bearer");

    let token = body["access_token"].as_str().unwrap();
    testing::get(app.router(), "/api/me")
        .bearer_token(token)
        .execute()
        .await
        .assert_ok();
}

#[tokio::test]
async fn test_login_rejects_wrong_password_and_unknown_email() {
    let app = TestApp::new();
    let alice = app.register("Alice").await;

    testing::post(app.router(), "/api/auth/login")
        .json_body(&json!({ "email": alice.email, "password": "not the password" }))
        .execute()
        .await
        .assert_unauthorized();

    testing::post(app.router(), "/api/auth/login")
        .json_body(&json!({ "email": "nobody@example.com", "password": "whatever123" }))
        .execute()
        .await
        .assert_unauthorized();
}

#[tokio::test]
async fn test_duplicate_email_conflicts() {
    let app = TestApp::new();
    let alice = app.register("Alice").await;

    testing::post(app.router(), "/api/auth/register")
        .json_body(&json!({
            "email": alice.email.to_uppercase(),
            "password": "another password",
            "display_name": "Alice again",
        }))
        .execute()
        .await
        .assert_conflict();
}

#[tokio::test]
async fn test_register_validates_input() {
    let app = TestApp::new();

    let errors = testing::post(app.router(), "/api/auth/register")
        .json_body(&json!({ "email": "not-an-email", "password": "short", "display_name": "A" }))
        .execute()
        .await
        .assert_unprocessable()
        .json_at("field_errors")
        .await;

    assert!(errors.get("email").is_some());
    assert!(errors.get("password").is_some());
}

#[tokio::test]
async fn test_protected_routes_need_a_valid_token() {
    let app = TestApp::new();

    testing::get(app.router(), "/api/me")
        .execute()
        .await
        .assert_unauthorized();

    testing::get(app.router(), "/api/oshi")
        .bearer_token("not-a-jwt")
        .execute()
        .await
        .assert_unauthorized();

    // A token signed by another deployment is rejected too.
    let other = TestApp::with_config(
        TestApp::config_builder()
            .with_jwt_secret("a-completely-different-secret-of-32-bytes")
            .build()
            .unwrap(),
    );
    let stranger = other.register("Stranger").await;
    testing::get(app.router(), "/api/me")
        .bearer_token(&stranger.token)
        .execute()
        .await
        .assert_unauthorized();
}
