use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::collections::BTreeMap;

/// Field name to list of messages.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// The main error type for Osikatu services and handlers
#[derive(Debug, thiserror::Error)]
pub enum OsikatuError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation failed: {}", format_field_errors(.0))]
    Validation(FieldErrors),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payment required: {0}")]
    PaymentRequired(String),

    #[error("Insufficient points: balance {balance}, required {required}")]
    InsufficientPoints { balance: i64, required: i64 },

    #[error("Too many requests: {0}")]
    TooManyRequests(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

fn format_field_errors(errors: &FieldErrors) -> String {
    errors
        .iter()
        .map(|(field, messages)| format!("{}: {}", field, messages.join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Standard error response format for API errors.
#[derive(Serialize)]
pub struct ErrorResponse {
    error: String,
    error_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field_errors: Option<FieldErrors>,
}

impl OsikatuError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn payment_required(msg: impl Into<String>) -> Self {
        Self::PaymentRequired(msg.into())
    }

    pub fn too_many_requests(msg: impl Into<String>) -> Self {
        Self::TooManyRequests(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    /// Single-field validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.into(), vec![message.into()]);
        Self::Validation(errors)
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) | Self::InsufficientPoints { .. } => StatusCode::CONFLICT,
            Self::PaymentRequired(_) => StatusCode::PAYMENT_REQUIRED,
            Self::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) | Self::Anyhow(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Returns a message suitable for client responses.
    ///
    /// Client errors (4xx) carry their message. Server errors (5xx) are
    /// replaced by a generic message; the details only go to the logs.
    fn safe_message(&self) -> String {
        match self {
            Self::Internal(_) | Self::Anyhow(_) => "Internal server error".to_string(),
            Self::ServiceUnavailable(_) => "Service unavailable".to_string(),
            Self::Validation(_) => "Validation failed".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for OsikatuError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_id = uuid::Uuid::new_v4().to_string();

        if status.is_server_error() {
            tracing::error!(
                status = status.as_u16(),
                error_id = %error_id,
                error = %self,
                "Request failed"
            );
        } else {
            tracing::debug!(
                status = status.as_u16(),
                error_id = %error_id,
                error = %self,
                "Request rejected"
            );
        }

        let field_errors = match &self {
            Self::Validation(errors) if !errors.is_empty() => Some(errors.clone()),
            _ => None,
        };

        let body = Json(ErrorResponse {
            error: self.safe_message(),
            error_id,
            field_errors,
        });

        (status, body).into_response()
    }
}

/// Result type alias for Osikatu handlers and services
pub type Result<T> = std::result::Result<T, OsikatuError>;

impl From<serde_json::Error> for OsikatuError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            OsikatuError::BadRequest(format!("JSON error: {}", err))
        } else {
            OsikatuError::Internal(format!("JSON serialization error: {}", err))
        }
    }
}

impl From<validator::ValidationErrors> for OsikatuError {
    fn from(err: validator::ValidationErrors) -> Self {
        let mut errors = FieldErrors::new();
        for (field, field_errors) in err.field_errors() {
            let messages = field_errors
                .iter()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string())
                })
                .collect();
            errors.insert(field.to_string(), messages);
        }
        if errors.is_empty() {
            errors.insert("body".to_string(), vec!["invalid".to_string()]);
        }
        OsikatuError::Validation(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(err: OsikatuError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(OsikatuError::not_found("x").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(OsikatuError::bad_request("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            OsikatuError::validation("name", "required").status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(OsikatuError::unauthorized("x").status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(OsikatuError::forbidden("x").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(OsikatuError::conflict("x").status_code(), StatusCode::CONFLICT);
        assert_eq!(
            OsikatuError::payment_required("x").status_code(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            OsikatuError::InsufficientPoints { balance: 1, required: 2 }.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            OsikatuError::too_many_requests("x").status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            OsikatuError::internal("x").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            OsikatuError::service_unavailable("x").status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn test_internal_error_message_is_hidden() {
        let (status, body) = body_json(OsikatuError::internal("db password is hunter2")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");
        assert!(body["error_id"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_client_error_message_is_kept() {
        let (status, body) = body_json(OsikatuError::not_found("Oshi not found")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Not found: Oshi not found");
        assert!(body.get("field_errors").is_none());
    }

    #[tokio::test]
    async fn test_validation_error_lists_fields() {
        let (status, body) = body_json(OsikatuError::validation("color", "must be #RRGGBB")).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["field_errors"]["color"][0], "must be #RRGGBB");
    }

    #[test]
    fn test_json_error_classification() {
        let err: OsikatuError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert!(matches!(err, OsikatuError::BadRequest(_)));
    }
}
