use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, instrument};

use super::{
    CategoryTotal, CreateExpenseRequest, Expense, ExpenseCategory, ExpenseFilter, ExpenseSummary,
    OshiTotal, UpdateExpenseRequest,
};
use crate::billing::{EntitlementsManager, features};
use crate::error::{OsikatuError, Result};
use crate::goods::GoodsItem;
use crate::http::{PaginatedData, PaginationQuery};
use crate::oplog::{NewOperation, OperationLogger};
use crate::oshi::{Oshi, ensure_oshi_ref, non_empty};
use crate::store::{Repository, get_owned};
use crate::validation::parse_month;

pub struct ExpenseService {
    repo: Arc<dyn Repository<Expense>>,
    oshi: Arc<dyn Repository<Oshi>>,
    goods: Arc<dyn Repository<GoodsItem>>,
    entitlements: Arc<EntitlementsManager>,
    oplog: Arc<OperationLogger>,
}

impl ExpenseService {
    pub fn new(
        repo: Arc<dyn Repository<Expense>>,
        oshi: Arc<dyn Repository<Oshi>>,
        goods: Arc<dyn Repository<GoodsItem>>,
        entitlements: Arc<EntitlementsManager>,
        oplog: Arc<OperationLogger>,
    ) -> Self {
        Self {
            repo,
            oshi,
            goods,
            entitlements,
            oplog,
        }
    }

    /// Newest `spent_on` first.
    pub async fn list(
        &self,
        user_id: &str,
        filter: &ExpenseFilter,
        page: &PaginationQuery,
    ) -> Result<PaginatedData<Expense>> {
        page.validate()?;
        let range = match &filter.month {
            Some(month) => Some(month_range(month)?),
            None => None,
        };

        let mut expenses: Vec<_> = self
            .repo
            .list_by_owner(user_id)
            .await?
            .into_iter()
            .filter(|e| range.is_none_or(|(start, end)| e.spent_on >= start && e.spent_on < end))
            .filter(|e| filter.oshi_id.is_none() || e.oshi_id == filter.oshi_id)
            .filter(|e| filter.category.is_none_or(|c| e.category == c))
            .collect();
        expenses.sort_by(|a, b| {
            b.spent_on
                .cmp(&a.spent_on)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(PaginatedData::from_vec(expenses, page))
    }

    pub async fn get(&self, user_id: &str, expense_id: &str) -> Result<Expense> {
        get_owned(self.repo.as_ref(), user_id, expense_id).await
    }

    #[instrument(skip(self, request))]
    pub async fn create(&self, user_id: &str, request: CreateExpenseRequest) -> Result<Expense> {
        let oshi_id = non_empty(request.oshi_id);
        ensure_oshi_ref(self.oshi.as_ref(), user_id, oshi_id.as_deref()).await?;

        let now = crate::utils::now();
        let expense = self
            .insert(Expense {
                id: crate::utils::new_id(),
                user_id: user_id.to_string(),
                oshi_id,
                category: request.category,
                amount: request.amount,
                spent_on: request.spent_on.unwrap_or_else(|| now.date_naive()),
                memo: non_empty(request.memo),
                goods_id: None,
                created_at: now,
            })
            .await?;
        Ok(expense)
    }

    /// Store an expense built elsewhere, such as one recorded for a goods purchase.
    pub(crate) async fn insert(&self, expense: Expense) -> Result<Expense> {
        let expense = self.repo.insert(expense).await?;
        info!(expense_id = %expense.id, amount = expense.amount, "Expense recorded");
        self.oplog
            .record(
                NewOperation::new("expense.create")
                    .actor(&expense.user_id)
                    .target("expense", &expense.id)
                    .metadata(serde_json::json!({
                        "amount": expense.amount,
                        "category": expense.category,
                    })),
            )
            .await;
        Ok(expense)
    }

    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        user_id: &str,
        expense_id: &str,
        request: UpdateExpenseRequest,
    ) -> Result<Expense> {
        let mut expense = self.get(user_id, expense_id).await?;

        if let Some(oshi_id) = request.oshi_id {
            let oshi_id = non_empty(Some(oshi_id));
            ensure_oshi_ref(self.oshi.as_ref(), user_id, oshi_id.as_deref()).await?;
            expense.oshi_id = oshi_id;
        }
        if let Some(category) = request.category {
            expense.category = category;
        }
        if let Some(amount) = request.amount {
            expense.amount = amount;
        }
        if let Some(spent_on) = request.spent_on {
            expense.spent_on = spent_on;
        }
        if let Some(memo) = request.memo {
            expense.memo = non_empty(Some(memo));
        }

        let expense = self.repo.update(expense).await?;
        self.oplog
            .record(
                NewOperation::new("expense.update")
                    .actor(user_id)
                    .target("expense", &expense.id),
            )
            .await;
        Ok(expense)
    }

    /// Deleting an expense unlinks it from the goods item it was recorded for.
    #[instrument(skip(self))]
    pub async fn delete(&self, user_id: &str, expense_id: &str) -> Result<()> {
        let expense = self.get(user_id, expense_id).await?;
        self.repo.delete(&expense.id).await?;

        if let Some(goods_id) = &expense.goods_id {
            if let Some(mut item) = self.goods.get(goods_id).await? {
                if item.expense_id.as_deref() == Some(expense.id.as_str()) {
                    item.expense_id = None;
                    self.goods.update(item).await?;
                }
            }
        }

        info!(expense_id = %expense.id, "Expense deleted");
        self.oplog
            .record(
                NewOperation::new("expense.delete")
                    .actor(user_id)
                    .target("expense", &expense.id),
            )
            .await;
        Ok(())
    }

    /// Clear `goods_id` on the expense that was recorded for a deleted goods item.
    pub(crate) async fn unlink_goods(&self, user_id: &str, goods_id: &str) -> Result<usize> {
        self.repo
            .update_many(user_id, &|e: &mut Expense| {
                if e.goods_id.as_deref() == Some(goods_id) {
                    e.goods_id = None;
                    true
                } else {
                    false
                }
            })
            .await
    }

    /// Monthly totals per category and per oshi. Needs the `expense_summary` feature.
    #[instrument(skip(self))]
    pub async fn summary(&self, user_id: &str, month: &str) -> Result<ExpenseSummary> {
        self.entitlements
            .require_feature(user_id, features::EXPENSE_SUMMARY)
            .await?;
        let (start, end) = month_range(month)?;

        let expenses: Vec<_> = self
            .repo
            .list_by_owner(user_id)
            .await?
            .into_iter()
            .filter(|e| e.spent_on >= start && e.spent_on < end)
            .collect();
        Ok(summarize(month, &expenses))
    }
}

fn month_range(month: &str) -> Result<(chrono::NaiveDate, chrono::NaiveDate)> {
    parse_month(month)
        .ok_or_else(|| OsikatuError::validation("month", "must be a month like 2024-05"))
}

fn summarize(month: &str, expenses: &[Expense]) -> ExpenseSummary {
    let mut by_category: HashMap<ExpenseCategory, i64> = HashMap::new();
    let mut by_oshi: HashMap<Option<String>, i64> = HashMap::new();
    for expense in expenses {
        *by_category.entry(expense.category).or_default() += expense.amount;
        *by_oshi.entry(expense.oshi_id.clone()).or_default() += expense.amount;
    }

    let mut by_category: Vec<_> = by_category
        .into_iter()
        .filter(|(_, total)| *total != 0)
        .map(|(category, total)| CategoryTotal { category, total })
        .collect();
    by_category.sort_by(|a, b| {
        b.total
            .cmp(&a.total)
            .then(a.category.as_str().cmp(b.category.as_str()))
    });

    let mut by_oshi: Vec<_> = by_oshi
        .into_iter()
        .filter(|(_, total)| *total != 0)
        .map(|(oshi_id, total)| OshiTotal { oshi_id, total })
        .collect();
    by_oshi.sort_by(|a, b| b.total.cmp(&a.total).then(a.oshi_id.cmp(&b.oshi_id)));

    ExpenseSummary {
        month: month.to_string(),
        total: expenses.iter().map(|e| e.amount).sum(),
        by_category,
        by_oshi,
    }
}
