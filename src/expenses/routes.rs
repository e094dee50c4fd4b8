use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};

use super::{CreateExpenseRequest, Expense, ExpenseFilter, ExpenseSummary, SummaryQuery, UpdateExpenseRequest};
use crate::app::AppContext;
use crate::auth::AuthUser;
use crate::error::Result;
use crate::http::{CreatedResponse, NoContentResponse, PaginatedData, PaginationQuery, RouteModule};
use crate::validation::{ValidatedJson, ValidatedQuery};

pub struct ExpenseModule;

impl RouteModule for ExpenseModule {
    fn routes(&self) -> Router<AppContext> {
        Router::new()
            .route("/", get(list).post(create))
            .route("/summary", get(summary))
            .route("/{id}", get(show).patch(update).delete(remove))
    }

    fn prefix(&self) -> Option<&str> {
        Some("/expenses")
    }
}

async fn list(
    user: AuthUser,
    State(ctx): State<AppContext>,
    ValidatedQuery(filter): ValidatedQuery<ExpenseFilter>,
    Query(page): Query<PaginationQuery>,
) -> Result<PaginatedData<Expense>> {
    ctx.expenses.list(&user.id, &filter, &page).await
}

async fn summary(
    user: AuthUser,
    State(ctx): State<AppContext>,
    ValidatedQuery(query): ValidatedQuery<SummaryQuery>,
) -> Result<Json<ExpenseSummary>> {
    Ok(Json(ctx.expenses.summary(&user.id, &query.month).await?))
}

async fn create(
    user: AuthUser,
    State(ctx): State<AppContext>,
    ValidatedJson(req): ValidatedJson<CreateExpenseRequest>,
) -> Result<CreatedResponse<Expense>> {
    let expense = ctx.expenses.create(&user.id, req).await?;
    let location = format!("/api/expenses/{}", expense.id);
    Ok(CreatedResponse::new(expense, location))
}

async fn show(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<Expense>> {
    Ok(Json(ctx.expenses.get(&user.id, &id).await?))
}

async fn update(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateExpenseRequest>,
) -> Result<Json<Expense>> {
    Ok(Json(ctx.expenses.update(&user.id, &id, req).await?))
}

async fn remove(
    user: AuthUser,
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<NoContentResponse> {
    ctx.expenses.delete(&user.id, &id).await?;
    Ok(NoContentResponse)
}
