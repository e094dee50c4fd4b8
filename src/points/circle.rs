use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use tracing::{info, instrument};

use super::ledger::{LedgerAccount, LedgerEntry, LedgerStore, NewLedgerEntry};
use super::service::ensure_positive;
use crate::circles::{CircleCleanup, CircleRole, CircleService};
use crate::error::{OsikatuError, Result};
use crate::http::{PaginatedData, PaginationQuery};
use crate::oplog::{NewOperation, OperationLogger};

/// Both sides of a contribution, written in one batch.
#[derive(Debug, Clone, Serialize)]
pub struct Contribution {
    pub user_entry: LedgerEntry,
    pub circle_entry: LedgerEntry,
}

/// Shared circle balances on the same ledger as personal points.
pub struct CirclePointsService {
    ledger: Arc<dyn LedgerStore>,
    circles: Arc<CircleService>,
    oplog: Arc<OperationLogger>,
}

impl CirclePointsService {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        circles: Arc<CircleService>,
        oplog: Arc<OperationLogger>,
    ) -> Self {
        Self {
            ledger,
            circles,
            oplog,
        }
    }

    /// Move `amount` personal points of a member into the circle.
    #[instrument(skip(self))]
    pub async fn contribute(&self, circle_id: &str, user_id: &str, amount: i64) -> Result<Contribution> {
        ensure_positive(amount)?;
        self.circles.require_member(circle_id, user_id).await?;

        let applied = self
            .ledger
            .apply(vec![
                NewLedgerEntry::new(LedgerAccount::User(user_id.to_string()), -amount, "circle contribution"),
                NewLedgerEntry::new(account(circle_id), amount, format!("contribution from {}", user_id)),
            ])
            .await?;

        let mut entries = applied.entries.into_iter();
        let (Some(user_entry), Some(circle_entry)) = (entries.next(), entries.next()) else {
            return Err(OsikatuError::internal("Ledger returned an incomplete batch"));
        };

        info!(circle_id, user_id, amount, balance = circle_entry.balance_after, "Circle points contributed");
        self.record(user_id, "circle_points.contribute", circle_id, amount, None)
            .await;

        Ok(Contribution {
            user_entry,
            circle_entry,
        })
    }

    /// Admin+ grant.
    #[instrument(skip(self, reason))]
    pub async fn add(&self, circle_id: &str, actor_id: &str, amount: i64, reason: &str) -> Result<LedgerEntry> {
        ensure_positive(amount)?;
        self.circles.require_role(circle_id, actor_id, CircleRole::Admin).await?;
        let entry = self.write(circle_id, amount, reason).await?;
        self.record(actor_id, "circle_points.add", circle_id, amount, Some(reason))
            .await;
        Ok(entry)
    }

    /// Admin+ spend; `InsufficientPoints` when the circle balance is too low.
    #[instrument(skip(self, reason))]
    pub async fn deduct(&self, circle_id: &str, actor_id: &str, amount: i64, reason: &str) -> Result<LedgerEntry> {
        ensure_positive(amount)?;
        self.circles.require_role(circle_id, actor_id, CircleRole::Admin).await?;
        let entry = self.write(circle_id, -amount, reason).await?;
        self.record(actor_id, "circle_points.deduct", circle_id, amount, Some(reason))
            .await;
        Ok(entry)
    }

    pub async fn balance(&self, circle_id: &str, user_id: &str) -> Result<i64> {
        self.circles.require_member(circle_id, user_id).await?;
        Ok(self.ledger.balance(&account(circle_id)).await?)
    }

    pub async fn history(
        &self,
        circle_id: &str,
        user_id: &str,
        page: &PaginationQuery,
    ) -> Result<PaginatedData<LedgerEntry>> {
        page.validate()?;
        self.circles.require_member(circle_id, user_id).await?;
        let entries = self.ledger.history(&account(circle_id)).await?;
        Ok(PaginatedData::from_vec(entries, page))
    }

    async fn write(&self, circle_id: &str, delta: i64, reason: &str) -> Result<LedgerEntry> {
        let applied = self
            .ledger
            .apply(vec![NewLedgerEntry::new(account(circle_id), delta, reason)])
            .await?;
        let entry = applied
            .entries
            .into_iter()
            .next()
            .ok_or_else(|| OsikatuError::internal("Ledger returned no entries"))?;
        info!(circle_id, delta, balance = entry.balance_after, "Circle points updated");
        Ok(entry)
    }

    async fn record(&self, actor_id: &str, action: &str, circle_id: &str, amount: i64, reason: Option<&str>) {
        self.oplog
            .record(
                NewOperation::new(action)
                    .actor(actor_id)
                    .target("circle", circle_id)
                    .metadata(json!({ "amount": amount, "reason": reason })),
            )
            .await;
    }
}

/// Drops a circle's ledger account when the circle is deleted.
pub struct CircleLedgerCleanup {
    ledger: Arc<dyn LedgerStore>,
}

impl CircleLedgerCleanup {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl CircleCleanup for CircleLedgerCleanup {
    async fn purge_circle(&self, circle_id: &str) -> Result<()> {
        Ok(self.ledger.remove_account(&account(circle_id)).await?)
    }
}

fn account(circle_id: &str) -> LedgerAccount {
    LedgerAccount::Circle(circle_id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::InMemoryUserStore;
    use crate::billing::{EntitlementsManager, InMemoryBillingStore, Plans};
    use crate::circles::{CreateCircleRequest, InMemoryCircleStore};
    use crate::oplog::{InMemoryOperationLogStore, RedactionPolicy};
    use crate::points::InMemoryLedgerStore;

    struct Fixture {
        points: CirclePointsService,
        circles: Arc<CircleService>,
        ledger: Arc<InMemoryLedgerStore>,
        circle_id: String,
    }

    async fn fixture() -> Fixture {
        let ledger = Arc::new(InMemoryLedgerStore::new());
        let oplog = Arc::new(OperationLogger::new(
            Arc::new(InMemoryOperationLogStore::new()),
            RedactionPolicy::default(),
        ));
        let circles = Arc::new(
            CircleService::new(
                Arc::new(InMemoryCircleStore::new()),
                Arc::new(InMemoryUserStore::new()),
                Arc::new(EntitlementsManager::new(
                    Arc::new(InMemoryBillingStore::new()),
                    Plans::standard(None, None),
                )),
                oplog.clone(),
            )
            .with_cleanup(Arc::new(CircleLedgerCleanup::new(ledger.clone()))),
        );

        let circle = circles
            .create(
                "owner",
                CreateCircleRequest {
                    name: "Fan club".into(),
                    description: None,
                    is_public: false,
                },
            )
            .await
            .unwrap();
        circles
            .join("member", circle.invite_code.as_deref().unwrap())
            .await
            .unwrap();

        Fixture {
            points: CirclePointsService::new(ledger.clone(), circles.clone(), oplog),
            circles,
            ledger,
            circle_id: circle.id,
        }
    }

    async fn grant(ledger: &InMemoryLedgerStore, user_id: &str, amount: i64) {
        ledger
            .apply(vec![NewLedgerEntry::new(LedgerAccount::User(user_id.into()), amount, "grant")])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_contribute_moves_points_atomically() {
        let f = fixture().await;
        grant(&f.ledger, "member", 100).await;

        let contribution = f.points.contribute(&f.circle_id, "member", 60).await.unwrap();
        assert_eq!(contribution.user_entry.balance_after, 40);
        assert_eq!(contribution.circle_entry.balance_after, 60);

        let err = f.points.contribute(&f.circle_id, "member", 41).await.unwrap_err();
        assert!(matches!(err, OsikatuError::InsufficientPoints { balance: 40, required: 41 }));
        assert_eq!(f.points.balance(&f.circle_id, "member").await.unwrap(), 60);
    }

    #[tokio::test]
    async fn test_add_and_deduct_require_admin() {
        let f = fixture().await;

        assert!(matches!(
            f.points.add(&f.circle_id, "member", 10, "prize").await.unwrap_err(),
            OsikatuError::Forbidden(_)
        ));
        f.points.add(&f.circle_id, "owner", 50, "event prize").await.unwrap();

        let err = f.points.deduct(&f.circle_id, "owner", 80, "banner").await.unwrap_err();
        assert!(matches!(err, OsikatuError::InsufficientPoints { balance: 50, .. }));

        let entry = f.points.deduct(&f.circle_id, "owner", 30, "banner").await.unwrap();
        assert_eq!(entry.balance_after, 20);
    }

    #[tokio::test]
    async fn test_reads_are_members_only() {
        let f = fixture().await;
        assert!(matches!(
            f.points.balance(&f.circle_id, "stranger").await.unwrap_err(),
            OsikatuError::Forbidden(_)
        ));

        f.points.add(&f.circle_id, "owner", 5, "a").await.unwrap();
        f.points.add(&f.circle_id, "owner", 7, "b").await.unwrap();
        let page = f
            .points
            .history(&f.circle_id, "member", &PaginationQuery::default())
            .await
            .unwrap();
        assert_eq!(page.items[0].reason, "b");
    }

    #[tokio::test]
    async fn test_concurrent_deducts_never_overdraw() {
        let f = fixture().await;
        f.points.add(&f.circle_id, "owner", 100, "seed").await.unwrap();
        let points = Arc::new(f.points);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let points = points.clone();
            let circle_id = f.circle_id.clone();
            handles.push(tokio::spawn(async move {
                points.deduct(&circle_id, "owner", 30, "spend").await.is_ok()
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap() {
                succeeded += 1;
            }
        }
        assert_eq!(succeeded, 3);
        assert_eq!(points.balance(&f.circle_id, "owner").await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_circle_delete_drops_ledger_account() {
        let f = fixture().await;
        f.points.add(&f.circle_id, "owner", 50, "seed").await.unwrap();

        f.circles.delete("owner", &f.circle_id).await.unwrap();
        assert_eq!(
            f.ledger
                .balance(&LedgerAccount::Circle(f.circle_id.clone()))
                .await
                .unwrap(),
            0
        );
    }
}
