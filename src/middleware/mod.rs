//! HTTP middleware configuration: CORS, request timeout and request ids.

mod cors;
mod timeout;

pub use cors::{CorsConfig, build_cors_layer};
pub use timeout::{TimeoutConfig, build_timeout_layer};

use axum::{extract::Request, http::HeaderMap, middleware::Next, response::Response};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

/// Header carrying the request id, set on every request and echoed on the response.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Assigns a UUID v4 request id to each incoming request
#[derive(Clone, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let request_id = Uuid::new_v4().to_string().parse().ok()?;
        Some(RequestId::new(request_id))
    }
}

/// Read the request id assigned by [`MakeRequestUuid`], if any.
///
/// Handlers pass it to the operation log so audit entries can be
/// correlated with access logs.
pub fn request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

tokio::task_local! {
    static CURRENT_REQUEST_ID: Option<String>;
}

/// Makes the request id visible to code running inside the handler.
///
/// Must sit inside `SetRequestIdLayer` so the header is already present.
pub async fn request_context(req: Request, next: Next) -> Response {
    let id = request_id(req.headers());
    CURRENT_REQUEST_ID.scope(id, next.run(req)).await
}

/// Request id of the request currently being handled, if any.
pub fn current_request_id() -> Option<String> {
    CURRENT_REQUEST_ID.try_with(Clone::clone).ok().flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Request};

    #[test]
    fn test_make_request_uuid() {
        let request = Request::builder().body(()).unwrap();
        let id = MakeRequestUuid.make_request_id(&request).unwrap();
        let value = id.header_value().to_str().unwrap();
        assert!(Uuid::parse_str(value).is_ok());
    }

    #[test]
    fn test_request_id_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_id(&headers), None);
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("abc-123"));
        assert_eq!(request_id(&headers), Some("abc-123".to_string()));
    }

    #[tokio::test]
    async fn test_current_request_id_scope() {
        assert_eq!(current_request_id(), None);
        let seen = CURRENT_REQUEST_ID
            .scope(Some("req-1".to_string()), async { current_request_id() })
            .await;
        assert_eq!(seen, Some("req-1".to_string()));
    }
}
