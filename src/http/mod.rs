//! HTTP response types, pagination and the RouteModule trait.

pub mod query;
pub mod response;
pub mod routes;

pub use query::PaginationQuery;
pub use response::{CreatedResponse, JsonResult, NoContentResponse, PaginatedData, PaginationMeta};
pub use routes::RouteModule;
