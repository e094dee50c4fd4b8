//! Alba-style request scenarios against an in-process router
//!
//! Requests go through `tower::ServiceExt::oneshot`, so no socket is bound.
//!
//! ```rust,ignore
//! let created: serde_json::Value = testing::post(app.router(), "/api/oshi")
//!     .bearer_token(&alice.token)
//!     .json_body(&json!({ "name": "Aoi" }))
//!     .execute()
//!     .await
//!     .assert_created()
//!     .json()
//!     .await;
//! ```

use axum::{
    Router,
    body::Body,
    http::{HeaderName, HeaderValue, Method, Request, StatusCode, header},
};
use serde::{Serialize, de::DeserializeOwned};
use tower::ServiceExt;

/// One request being prepared
pub struct Scenario {
    app: Router,
    request: Request<Body>,
}

impl Scenario {
    pub fn new(app: Router, method: Method, uri: &str) -> Self {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap_or_else(|e| panic!("invalid request for {}: {}", uri, e));
        Self { app, request }
    }

    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.request.headers_mut().insert(
            HeaderName::from_bytes(key.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
        self
    }

    pub fn bearer_token(self, token: &str) -> Self {
        self.header("authorization", &format!("Bearer {}", token))
    }

    /// Append query parameters, keeping any already in the uri.
    pub fn with_query<T: Serialize>(mut self, params: &T) -> Self {
        let encoded = serde_urlencoded::to_string(params).unwrap();
        if encoded.is_empty() {
            return self;
        }

        let uri = self.request.uri();
        let joined = match uri.query() {
            Some(existing) => format!("{}?{}&{}", uri.path(), existing, encoded),
            None => format!("{}?{}", uri.path(), encoded),
        };
        *self.request.uri_mut() = joined.parse().unwrap();
        self
    }

    pub fn json_body<T: Serialize>(mut self, body: &T) -> Self {
        let json = serde_json::to_vec(body).unwrap();
        *self.request.body_mut() = Body::from(json);
        self.request.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self
    }

    /// Raw body, e.g. a webhook payload that must reach the handler byte for byte.
    pub fn raw_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        *self.request.body_mut() = Body::from(body.into());
        self
    }

    pub async fn execute(self) -> ScenarioAssert {
        let response = self.app.oneshot(self.request).await.unwrap();
        ScenarioAssert { response }
    }
}

/// Assertions on the response of a [`Scenario`]
pub struct ScenarioAssert {
    response: axum::response::Response,
}

impl ScenarioAssert {
    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    #[track_caller]
    pub fn assert_status(self, expected: StatusCode) -> Self {
        assert_eq!(
            self.response.status(),
            expected,
            "Expected status {}, got {}",
            expected,
            self.response.status()
        );
        self
    }

    #[track_caller]
    pub fn assert_ok(self) -> Self {
        self.assert_status(StatusCode::OK)
    }

    #[track_caller]
    pub fn assert_created(self) -> Self {
        self.assert_status(StatusCode::CREATED)
    }

    #[track_caller]
    pub fn assert_no_content(self) -> Self {
        self.assert_status(StatusCode::NO_CONTENT)
    }

    #[track_caller]
    pub fn assert_bad_request(self) -> Self {
        self.assert_status(StatusCode::BAD_REQUEST)
    }

    #[track_caller]
    pub fn assert_unauthorized(self) -> Self {
        self.assert_status(StatusCode::UNAUTHORIZED)
    }

    #[track_caller]
    pub fn assert_payment_required(self) -> Self {
        self.assert_status(StatusCode::PAYMENT_REQUIRED)
    }

    #[track_caller]
    pub fn assert_forbidden(self) -> Self {
        self.assert_status(StatusCode::FORBIDDEN)
    }

    #[track_caller]
    pub fn assert_not_found(self) -> Self {
        self.assert_status(StatusCode::NOT_FOUND)
    }

    #[track_caller]
    pub fn assert_conflict(self) -> Self {
        self.assert_status(StatusCode::CONFLICT)
    }

    #[track_caller]
    pub fn assert_unprocessable(self) -> Self {
        self.assert_status(StatusCode::UNPROCESSABLE_ENTITY)
    }

    #[track_caller]
    pub fn assert_header(self, key: &str, expected: &str) -> Self {
        let value = self
            .response
            .headers()
            .get(key)
            .unwrap_or_else(|| panic!("Header '{}' not found", key))
            .to_str()
            .unwrap();
        assert_eq!(value, expected, "Header '{}' value mismatch", key);
        self
    }

    pub fn header(&self, key: &str) -> Option<String> {
        self.response
            .headers()
            .get(key)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    pub async fn body_bytes(self) -> Vec<u8> {
        axum::body::to_bytes(self.response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    pub async fn json<T: DeserializeOwned>(self) -> T {
        let bytes = self.body_bytes().await;
        serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            panic!(
                "Failed to parse JSON response ({}): {}",
                e,
                String::from_utf8_lossy(&bytes)
            )
        })
    }

    /// Value at a dotted path such as `items.0.name`.
    pub async fn json_at(self, path: &str) -> serde_json::Value {
        let body: serde_json::Value = self.json().await;
        json_path_get(&body, path)
            .cloned()
            .unwrap_or_else(|| panic!("Path '{}' not found in {}", path, body))
    }
}

fn json_path_get<'a>(json: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    path.split('.').try_fold(json, |current, part| match part.parse::<usize>() {
        Ok(index) => current.get(index),
        Err(_) => current.get(part),
    })
}

pub fn get(app: Router, uri: &str) -> Scenario {
    Scenario::new(app, Method::GET, uri)
}

pub fn post(app: Router, uri: &str) -> Scenario {
    Scenario::new(app, Method::POST, uri)
}

pub fn put(app: Router, uri: &str) -> Scenario {
    Scenario::new(app, Method::PUT, uri)
}

pub fn patch(app: Router, uri: &str) -> Scenario {
    Scenario::new(app, Method::PATCH, uri)
}

pub fn delete(app: Router, uri: &str) -> Scenario {
    Scenario::new(app, Method::DELETE, uri)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, extract::Query, routing::get as axum_get};
    use serde_json::json;
    use std::collections::HashMap;

    async fn echo(Query(params): Query<HashMap<String, String>>) -> Json<serde_json::Value> {
        Json(json!({ "params": params, "items": [{ "name": "first" }] }))
    }

    fn app() -> Router {
        Router::new().route("/echo", axum_get(echo))
    }

    #[tokio::test]
    async fn test_query_is_appended() {
        let body: serde_json::Value = get(app(), "/echo?a=1")
            .with_query(&[("month", "2024-05")])
            .execute()
            .await
            .assert_ok()
            .json()
            .await;
        assert_eq!(body["params"]["a"], "1");
        assert_eq!(body["params"]["month"], "2024-05");
    }

    #[tokio::test]
    async fn test_json_at() {
        let name = get(app(), "/echo").execute().await.json_at("items.0.name").await;
        assert_eq!(name, "first");
    }

    #[tokio::test]
    async fn test_unknown_route() {
        get(app(), "/missing").execute().await.assert_not_found();
    }
}
