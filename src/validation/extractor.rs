use crate::error::OsikatuError;
use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Request},
    http::request::Parts,
};
use serde::de::DeserializeOwned;
use validator::Validate;

/// JSON body extractor that runs `validator` rules before the handler
///
/// Malformed JSON is a `BadRequest`; a body that parses but breaks a rule is
/// a `Validation` error listing every offending field.
///
/// ```rust,no_run
/// use osikatu::validation::ValidatedJson;
/// use serde::Deserialize;
/// use validator::Validate;
///
/// #[derive(Deserialize, Validate)]
/// struct CreateOshi {
///     #[validate(length(min = 1, max = 50))]
///     name: String,
/// }
///
/// async fn create(ValidatedJson(req): ValidatedJson<CreateOshi>) -> osikatu::Result<()> {
///     Ok(())
/// }
/// ```
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + Send,
    S: Send + Sync,
{
    type Rejection = OsikatuError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| OsikatuError::bad_request(format!("Invalid JSON: {}", e.body_text())))?;

        value.validate()?;

        Ok(ValidatedJson(value))
    }
}

/// Query string extractor with the same validation behaviour as [`ValidatedJson`]
pub struct ValidatedQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ValidatedQuery<T>
where
    T: DeserializeOwned + Validate + Send,
    S: Send + Sync,
{
    type Rejection = OsikatuError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let query_string = parts.uri.query().unwrap_or("");
        let query: T = serde_urlencoded::from_str(query_string).map_err(|e| {
            OsikatuError::bad_request(format!("Invalid query parameters: {}", e))
        })?;

        query.validate()?;

        Ok(ValidatedQuery(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, Validate)]
    struct TestRequest {
        #[validate(email)]
        email: String,
        #[validate(range(min = 1, max = 5))]
        mood: u8,
    }

    fn json_request(body: &str) -> Request {
        Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_validated_json_success() {
        let req = json_request(r#"{"email":"fan@example.com","mood":3}"#);
        let ValidatedJson(value) = ValidatedJson::<TestRequest>::from_request(req, &()).await.unwrap();
        assert_eq!(value.mood, 3);
    }

    #[tokio::test]
    async fn test_validated_json_rule_failure() {
        let req = json_request(r#"{"email":"not-an-email","mood":9}"#);
        let err = ValidatedJson::<TestRequest>::from_request(req, &())
            .await
            .err()
            .unwrap();
        match err {
            OsikatuError::Validation(fields) => {
                assert!(fields.contains_key("email"));
                assert!(fields.contains_key("mood"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_validated_json_malformed() {
        let req = json_request("{");
        let err = ValidatedJson::<TestRequest>::from_request(req, &())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, OsikatuError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_validated_query() {
        let req = Request::builder()
            .uri("/?email=fan%40example.com&mood=2")
            .body(Body::empty())
            .unwrap();
        let (mut parts, _) = req.into_parts();
        let ValidatedQuery(value) = ValidatedQuery::<TestRequest>::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(value.email, "fan@example.com");
    }
}
