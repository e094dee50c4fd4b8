use axum::{
    Router,
    extract::{Query, State},
    routing::get,
};

use super::OperationLog;
use crate::app::AppContext;
use crate::auth::AuthUser;
use crate::error::Result;
use crate::http::{PaginatedData, PaginationQuery, RouteModule};

pub struct OperationLogModule;

impl RouteModule for OperationLogModule {
    fn routes(&self) -> Router<AppContext> {
        Router::new().route("/", get(list_logs))
    }

    fn prefix(&self) -> Option<&str> {
        Some("/operation-logs")
    }
}

async fn list_logs(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Query(page): Query<PaginationQuery>,
) -> Result<PaginatedData<OperationLog>> {
    ctx.oplog.list_for_user(&user.id, &page).await
}
