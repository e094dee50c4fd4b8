use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use super::query::PaginationQuery;

/// One page of a listing
#[derive(Debug, Serialize)]
pub struct PaginatedData<T: Serialize> {
    pub items: Vec<T>,
    pub pagination: PaginationMeta,
}

/// Pagination metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaginationMeta {
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

impl<T: Serialize> PaginatedData<T> {
    /// Slice an already ordered collection into the requested page.
    pub fn from_vec(items: Vec<T>, query: &PaginationQuery) -> Self {
        let total = items.len() as u64;
        let items = items
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit() as usize)
            .collect();

        Self {
            items,
            pagination: PaginationMeta {
                total,
                page: query.page,
                per_page: query.per_page,
                total_pages: total.div_ceil(u64::from(query.per_page.max(1))) as u32,
            },
        }
    }

    pub fn map<U: Serialize>(self, f: impl FnMut(T) -> U) -> PaginatedData<U> {
        PaginatedData {
            items: self.items.into_iter().map(f).collect(),
            pagination: self.pagination,
        }
    }
}

impl<T: Serialize> IntoResponse for PaginatedData<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// 201 Created response with a Location header
#[derive(Debug, Serialize)]
pub struct CreatedResponse<T: Serialize> {
    pub data: T,
    pub location: String,
}

impl<T: Serialize> CreatedResponse<T> {
    pub fn new(data: T, location: impl Into<String>) -> Self {
        Self {
            data,
            location: location.into(),
        }
    }
}

impl<T: Serialize> IntoResponse for CreatedResponse<T> {
    fn into_response(self) -> Response {
        let mut response = (StatusCode::CREATED, Json(self.data)).into_response();
        if let Ok(location) = self.location.parse() {
            response
                .headers_mut()
                .insert(axum::http::header::LOCATION, location);
        } else {
            tracing::warn!(location = %self.location, "Invalid Location header value in CreatedResponse");
        }
        response
    }
}

/// 204 No Content response
#[derive(Debug, Clone, Copy)]
pub struct NoContentResponse;

impl IntoResponse for NoContentResponse {
    fn into_response(self) -> Response {
        StatusCode::NO_CONTENT.into_response()
    }
}

/// Convenience type alias for JSON handler results
pub type JsonResult<T> = crate::error::Result<Json<T>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vec_pages() {
        let query = PaginationQuery { page: 2, per_page: 2 };
        let page = PaginatedData::from_vec(vec![1, 2, 3, 4, 5], &query);
        assert_eq!(page.items, vec![3, 4]);
        assert_eq!(page.pagination.total, 5);
        assert_eq!(page.pagination.total_pages, 3);
    }

    #[test]
    fn test_from_vec_past_the_end() {
        let query = PaginationQuery { page: 9, per_page: 20 };
        let page = PaginatedData::from_vec(vec!["a"], &query);
        assert!(page.items.is_empty());
        assert_eq!(page.pagination.total_pages, 1);
    }

    #[test]
    fn test_created_response_sets_location() {
        let response = CreatedResponse::new(serde_json::json!({"id": "1"}), "/api/oshi/1").into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["location"], "/api/oshi/1");
    }
}
