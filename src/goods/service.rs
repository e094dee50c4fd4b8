use std::sync::Arc;

use tracing::{debug, info, instrument};

use super::{CreateGoodsRequest, GoodsFilter, GoodsItem, UpdateGoodsRequest};
use crate::error::{OsikatuError, Result};
use crate::expenses::{Expense, ExpenseCategory, ExpenseService, MAX_AMOUNT};
use crate::http::{PaginatedData, PaginationQuery};
use crate::oplog::{NewOperation, OperationLogger};
use crate::oshi::{Oshi, ensure_oshi_ref, non_empty};
use crate::store::{Repository, get_owned};

pub struct GoodsService {
    repo: Arc<dyn Repository<GoodsItem>>,
    oshi: Arc<dyn Repository<Oshi>>,
    expenses: Arc<ExpenseService>,
    oplog: Arc<OperationLogger>,
}

impl GoodsService {
    pub fn new(
        repo: Arc<dyn Repository<GoodsItem>>,
        oshi: Arc<dyn Repository<Oshi>>,
        expenses: Arc<ExpenseService>,
        oplog: Arc<OperationLogger>,
    ) -> Self {
        Self {
            repo,
            oshi,
            expenses,
            oplog,
        }
    }

    /// Most recent purchase first.
    pub async fn list(
        &self,
        user_id: &str,
        filter: &GoodsFilter,
        page: &PaginationQuery,
    ) -> Result<PaginatedData<GoodsItem>> {
        page.validate()?;
        let mut items: Vec<_> = self
            .repo
            .list_by_owner(user_id)
            .await?
            .into_iter()
            .filter(|g| filter.oshi_id.is_none() || g.oshi_id == filter.oshi_id)
            .filter(|g| filter.category.is_none_or(|c| g.category == c))
            .collect();
        items.sort_by(|a, b| {
            b.purchased_on
                .cmp(&a.purchased_on)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(PaginatedData::from_vec(items, page))
    }

    pub async fn get(&self, user_id: &str, goods_id: &str) -> Result<GoodsItem> {
        get_owned(self.repo.as_ref(), user_id, goods_id).await
    }

    /// With `record_expense` and a non-zero total, a linked `goods` expense is
    /// written for the same oshi and day.
    #[instrument(skip(self, request))]
    pub async fn create(&self, user_id: &str, request: CreateGoodsRequest) -> Result<GoodsItem> {
        let oshi_id = non_empty(request.oshi_id);
        ensure_oshi_ref(self.oshi.as_ref(), user_id, oshi_id.as_deref()).await?;

        let total = request
            .unit_price
            .checked_mul(i64::from(request.quantity))
            .filter(|total| *total <= MAX_AMOUNT);
        if request.record_expense && total.is_none() {
            return Err(OsikatuError::validation(
                "quantity",
                format!("total price must not exceed {}", MAX_AMOUNT),
            ));
        }

        let now = crate::utils::now();
        let mut item = self
            .repo
            .insert(GoodsItem {
                id: crate::utils::new_id(),
                user_id: user_id.to_string(),
                oshi_id,
                name: request.name.trim().to_string(),
                category: request.category,
                unit_price: request.unit_price,
                quantity: request.quantity,
                purchased_on: request.purchased_on.unwrap_or_else(|| now.date_naive()),
                shop: non_empty(request.shop),
                memo: non_empty(request.memo),
                expense_id: None,
                created_at: now,
            })
            .await?;

        if let Some(total) = total.filter(|t| request.record_expense && *t > 0) {
            let expense = self
                .expenses
                .insert(Expense {
                    id: crate::utils::new_id(),
                    user_id: user_id.to_string(),
                    oshi_id: item.oshi_id.clone(),
                    category: ExpenseCategory::Goods,
                    amount: total,
                    spent_on: item.purchased_on,
                    memo: Some(item.name.clone()),
                    goods_id: Some(item.id.clone()),
                    created_at: now,
                })
                .await?;
            item.expense_id = Some(expense.id);
            item = self.repo.update(item).await?;
            debug!(goods_id = %item.id, "Linked expense recorded");
        }

        info!(goods_id = %item.id, "Goods recorded");
        self.oplog
            .record(
                NewOperation::new("goods.create")
                    .actor(user_id)
                    .target("goods", &item.id)
                    .metadata(serde_json::json!({ "total_price": item.total_price() })),
            )
            .await;
        Ok(item)
    }

    /// The linked expense, if any, is left as it was.
    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        user_id: &str,
        goods_id: &str,
        request: UpdateGoodsRequest,
    ) -> Result<GoodsItem> {
        let mut item = self.get(user_id, goods_id).await?;

        if let Some(oshi_id) = request.oshi_id {
            let oshi_id = non_empty(Some(oshi_id));
            ensure_oshi_ref(self.oshi.as_ref(), user_id, oshi_id.as_deref()).await?;
            item.oshi_id = oshi_id;
        }
        if let Some(name) = request.name {
            item.name = name.trim().to_string();
        }
        if let Some(category) = request.category {
            item.category = category;
        }
        if let Some(unit_price) = request.unit_price {
            item.unit_price = unit_price;
        }
        if let Some(quantity) = request.quantity {
            item.quantity = quantity;
        }
        if let Some(purchased_on) = request.purchased_on {
            item.purchased_on = purchased_on;
        }
        if let Some(shop) = request.shop {
            item.shop = non_empty(Some(shop));
        }
        if let Some(memo) = request.memo {
            item.memo = non_empty(Some(memo));
        }

        let item = self.repo.update(item).await?;
        self.oplog
            .record(
                NewOperation::new("goods.update")
                    .actor(user_id)
                    .target("goods", &item.id),
            )
            .await;
        Ok(item)
    }

    /// The linked expense stays but forgets the goods item.
    #[instrument(skip(self))]
    pub async fn delete(&self, user_id: &str, goods_id: &str) -> Result<()> {
        let item = self.get(user_id, goods_id).await?;
        self.repo.delete(&item.id).await?;
        let unlinked = self.expenses.unlink_goods(user_id, &item.id).await?;

        info!(goods_id = %item.id, unlinked, "Goods deleted");
        self.oplog
            .record(
                NewOperation::new("goods.delete")
                    .actor(user_id)
                    .target("goods", &item.id),
            )
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::{EntitlementsManager, InMemoryBillingStore, Plans};
    use crate::oplog::{InMemoryOperationLogStore, RedactionPolicy};
    use crate::store::InMemoryRepository;
    use serde_json::json;

    struct Fixture {
        goods: GoodsService,
        expenses: Arc<ExpenseService>,
    }

    fn fixture() -> Fixture {
        let oplog = Arc::new(OperationLogger::new(
            Arc::new(InMemoryOperationLogStore::new()),
            RedactionPolicy::default(),
        ));
        let entitlements = Arc::new(EntitlementsManager::new(
            Arc::new(InMemoryBillingStore::new()),
            Plans::standard(None, None),
        ));
        let oshi: Arc<dyn Repository<Oshi>> = InMemoryRepository::shared();
        let goods_repo: Arc<dyn Repository<GoodsItem>> = InMemoryRepository::shared();
        let expenses = Arc::new(ExpenseService::new(
            InMemoryRepository::shared(),
            oshi.clone(),
            goods_repo.clone(),
            entitlements,
            oplog.clone(),
        ));
        Fixture {
            goods: GoodsService::new(goods_repo, oshi, expenses.clone(), oplog),
            expenses,
        }
    }

    fn request(value: serde_json::Value) -> CreateGoodsRequest {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_record_expense_links_both_ways() {
        let f = fixture();
        let item = f
            .goods
            .create(
                "u1",
                request(json!({
                    "name": "Tour towel",
                    "category": "towel",
                    "unit_price": 2500,
                    "quantity": 2,
                    "purchased_on": "2024-05-03",
                    "record_expense": true,
                })),
            )
            .await
            .unwrap();

        let expense_id = item.expense_id.clone().unwrap();
        let expense = f.expenses.get("u1", &expense_id).await.unwrap();
        assert_eq!(expense.amount, 5000);
        assert_eq!(expense.category, ExpenseCategory::Goods);
        assert_eq!(expense.goods_id.as_deref(), Some(item.id.as_str()));
        assert_eq!(expense.spent_on, item.purchased_on);
    }

    #[tokio::test]
    async fn test_free_goods_record_no_expense() {
        let f = fixture();
        let item = f
            .goods
            .create(
                "u1",
                request(json!({ "name": "Flyer", "unit_price": 0, "record_expense": true })),
            )
            .await
            .unwrap();
        assert!(item.expense_id.is_none());
    }

    #[tokio::test]
    async fn test_delete_keeps_expense_but_unlinks() {
        let f = fixture();
        let item = f
            .goods
            .create(
                "u1",
                request(json!({ "name": "Badge", "unit_price": 500, "record_expense": true })),
            )
            .await
            .unwrap();
        let expense_id = item.expense_id.clone().unwrap();

        f.goods.delete("u1", &item.id).await.unwrap();
        let expense = f.expenses.get("u1", &expense_id).await.unwrap();
        assert!(expense.goods_id.is_none());
    }

    #[tokio::test]
    async fn test_deleting_expense_unlinks_goods() {
        let f = fixture();
        let item = f
            .goods
            .create(
                "u1",
                request(json!({ "name": "Photo set", "unit_price": 800, "record_expense": true })),
            )
            .await
            .unwrap();

        f.expenses
            .delete("u1", item.expense_id.as_deref().unwrap())
            .await
            .unwrap();
        assert!(f.goods.get("u1", &item.id).await.unwrap().expense_id.is_none());
    }

    #[tokio::test]
    async fn test_oversized_total_is_rejected() {
        let f = fixture();
        let err = f
            .goods
            .create(
                "u1",
                request(json!({
                    "name": "Bulk",
                    "unit_price": 10_000_000,
                    "quantity": 2,
                    "record_expense": true,
                })),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OsikatuError::Validation(_)));
    }

    #[tokio::test]
    async fn test_list_filters_by_category() {
        let f = fixture();
        for (name, category) in [("Stand", "acrylic_stand"), ("Shirt", "apparel")] {
            f.goods
                .create(
                    "u1",
                    request(json!({ "name": name, "category": category, "unit_price": 100 })),
                )
                .await
                .unwrap();
        }
        let filter = GoodsFilter {
            category: Some(crate::goods::GoodsCategory::Apparel),
            ..Default::default()
        };
        let page = f
            .goods
            .list("u1", &filter, &PaginationQuery::default())
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].name, "Shirt");
    }
}
