use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use super::pool::draw_items;
use super::{
    DrawLimit, DrawResult, GachaConfig, GachaStore, InsertOutcome, PoolEntry, PoolView, SINGLE,
    TEN_PULL,
};
use crate::billing::{EntitlementsManager, features, limits};
use crate::error::{OsikatuError, Result};
use crate::http::{PaginatedData, PaginationQuery};
use crate::oplog::{NewOperation, OperationLogger};
use crate::points::PointsService;

pub struct GachaService {
    store: Arc<dyn GachaStore>,
    points: Arc<PointsService>,
    entitlements: Arc<EntitlementsManager>,
    config: GachaConfig,
    rng: Mutex<StdRng>,
    oplog: Arc<OperationLogger>,
}

impl GachaService {
    pub fn new(
        store: Arc<dyn GachaStore>,
        points: Arc<PointsService>,
        entitlements: Arc<EntitlementsManager>,
        config: GachaConfig,
        oplog: Arc<OperationLogger>,
    ) -> Self {
        Self {
            store,
            points,
            entitlements,
            config,
            rng: Mutex::new(StdRng::from_entropy()),
            oplog,
        }
    }

    /// Replace the random source, e.g. with a seeded one in tests.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    pub fn pool(&self) -> PoolView {
        let total = self.config.pool.total_weight() as f64;
        PoolView {
            single_cost: self.config.single_cost,
            ten_pull_cost: self.config.ten_pull_cost,
            guaranteed_rarity: self.config.guaranteed_rarity,
            items: self
                .config
                .pool
                .items
                .iter()
                .map(|item| PoolEntry {
                    item: item.clone(),
                    probability: f64::from(item.weight) / total,
                })
                .collect(),
        }
    }

    /// Draw `count` (1 or 10) items.
    ///
    /// The charge uses the idempotency key `gacha:{request_id}`, so a
    /// replayed request id returns the stored result and costs nothing. A
    /// draw that cannot be stored after the charge is refunded under
    /// `gacha-refund:{request_id}`.
    #[instrument(skip(self))]
    pub async fn draw(&self, user_id: &str, count: u32, request_id: &str) -> Result<DrawResult> {
        if count != SINGLE && count != TEN_PULL {
            return Err(OsikatuError::validation("count", "must be 1 or 10"));
        }

        if let Some(existing) = self.store.find_by_request(user_id, request_id).await? {
            debug!(user_id, request_id, "Gacha draw replayed");
            return Ok(existing);
        }

        let entitlements = self.entitlements.for_user(user_id).await?;
        if count == TEN_PULL {
            entitlements.require_feature(features::TEN_PULL)?;
        }
        let limit = entitlements.limits.get(limits::GACHA_DAILY_DRAWS).map(|max| DrawLimit {
            since: start_of_day(crate::utils::now()),
            max,
        });
        // Early rejection before charging; the insert enforces it atomically.
        if let Some(limit) = limit {
            let drawn = self.store.items_drawn_since(user_id, limit.since).await?;
            if drawn + u64::from(count) > limit.max {
                return Err(limit_reached(user_id, drawn, limit.max));
            }
        }

        let cost = self.config.cost(count);
        let charge = self
            .points
            .spend(user_id, cost, "gacha draw", Some(format!("gacha:{}", request_id)))
            .await?;
        if !charge.created {
            // Charged by a concurrent request with the same id, or refunded.
            return self
                .store
                .find_by_request(user_id, request_id)
                .await?
                .ok_or_else(|| {
                    OsikatuError::conflict(
                        "This draw is still being processed or was refunded; retry with a new request id",
                    )
                });
        }

        let items = {
            let mut rng = self.rng.lock().await;
            draw_items(&self.config.pool, count, self.config.guaranteed_rarity, &mut *rng)
        };

        let candidate = DrawResult {
            id: crate::utils::new_id(),
            user_id: user_id.to_string(),
            request_id: request_id.to_string(),
            items,
            points_spent: cost,
            created_at: crate::utils::now(),
        };
        let result = match self.store.insert(candidate, limit).await {
            Ok(InsertOutcome::Inserted(result)) => result,
            Ok(InsertOutcome::Duplicate(existing)) => {
                self.refund(user_id, request_id, cost).await;
                return Ok(existing);
            }
            Ok(InsertOutcome::LimitReached { drawn }) => {
                self.refund(user_id, request_id, cost).await;
                return Err(limit_reached(user_id, drawn, limit.map_or(0, |l| l.max)));
            }
            Err(e) => {
                self.refund(user_id, request_id, cost).await;
                return Err(e);
            }
        };

        let best = result.items.iter().map(|i| i.rarity).max();
        info!(user_id, count, cost, best = ?best, "Gacha draw");
        self.oplog
            .record(
                NewOperation::new("gacha.draw")
                    .actor(user_id)
                    .target("gacha_draw", &result.id)
                    .metadata(json!({
                        "count": count,
                        "points_spent": cost,
                        "item_ids": result.items.iter().map(|i| &i.id).collect::<Vec<_>>(),
                    })),
            )
            .await;

        Ok(result)
    }

    /// Give back the charge of a draw that was not stored.
    async fn refund(&self, user_id: &str, request_id: &str, cost: i64) {
        match self
            .points
            .add(user_id, cost, "gacha refund", Some(format!("gacha-refund:{}", request_id)))
            .await
        {
            Ok(_) => warn!(user_id, request_id, cost, "Gacha draw refunded"),
            Err(e) => error!(error = %e, user_id, request_id, cost, "Gacha refund failed"),
        }
    }

    pub async fn history(
        &self,
        user_id: &str,
        page: &PaginationQuery,
    ) -> Result<PaginatedData<DrawResult>> {
        page.validate()?;
        let results = self.store.history(user_id).await?;
        Ok(PaginatedData::from_vec(results, page))
    }
}

fn limit_reached(user_id: &str, drawn: u64, max: u64) -> OsikatuError {
    warn!(user_id, drawn, max, "Daily gacha limit reached");
    OsikatuError::too_many_requests(format!(
        "Daily gacha limit of {} draws reached ({} drawn today)",
        max, drawn
    ))
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::{
        BillingStore, InMemoryBillingStore, Plans, StoredSubscription, SubscriptionStatus,
    };
    use crate::gacha::{GachaItem, GachaPool, InMemoryGachaStore, Rarity};
    use crate::oplog::{InMemoryOperationLogStore, RedactionPolicy};
    use crate::points::{InMemoryLedgerStore, PointsConfig};

    struct Fixture {
        gacha: GachaService,
        points: Arc<PointsService>,
        billing: Arc<InMemoryBillingStore>,
    }

    fn fixture(config: GachaConfig) -> Fixture {
        fixture_with_store(config, Arc::new(InMemoryGachaStore::new()))
    }

    fn fixture_with_store(config: GachaConfig, store: Arc<dyn GachaStore>) -> Fixture {
        let oplog = Arc::new(OperationLogger::new(
            Arc::new(InMemoryOperationLogStore::new()),
            RedactionPolicy::default(),
        ));
        let billing = Arc::new(InMemoryBillingStore::new());
        let entitlements = Arc::new(EntitlementsManager::new(
            billing.clone(),
            Plans::standard(None, None),
        ));
        let points = Arc::new(PointsService::new(
            Arc::new(InMemoryLedgerStore::new()),
            PointsConfig::default(),
            oplog.clone(),
        ));
        let gacha = GachaService::new(
            store,
            points.clone(),
            entitlements,
            config,
            oplog,
        )
        .with_rng(StdRng::seed_from_u64(2024));
        Fixture {
            gacha,
            points,
            billing,
        }
    }

    async fn upgrade(billing: &InMemoryBillingStore, user_id: &str, plan_id: &str) {
        billing
            .save_subscription(StoredSubscription {
                user_id: user_id.into(),
                stripe_subscription_id: "sub_1".into(),
                stripe_customer_id: "cus_1".into(),
                plan_id: plan_id.into(),
                status: SubscriptionStatus::Active,
                current_period_end: None,
                cancel_at_period_end: false,
                synced_event_at: 0,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_single_draw_charges_points() {
        let f = fixture(GachaConfig::default());
        f.points.add("u1", 100, "seed", None).await.unwrap();

        let result = f.gacha.draw("u1", 1, "req-aaaa-0001").await.unwrap();
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.points_spent, 30);
        assert_eq!(f.points.balance("u1").await.unwrap(), 70);
    }

    #[tokio::test]
    async fn test_replayed_request_is_free() {
        let f = fixture(GachaConfig::default());
        f.points.add("u1", 100, "seed", None).await.unwrap();

        let first = f.gacha.draw("u1", 1, "req-aaaa-0001").await.unwrap();
        let second = f.gacha.draw("u1", 1, "req-aaaa-0001").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(f.points.balance("u1").await.unwrap(), 70);

        let page = f.gacha.history("u1", &PaginationQuery::default()).await.unwrap();
        assert_eq!(page.items.len(), 1);
    }

    #[tokio::test]
    async fn test_insufficient_points_draws_nothing() {
        let f = fixture(GachaConfig::default());
        let err = f.gacha.draw("u1", 1, "req-aaaa-0001").await.unwrap_err();
        assert!(matches!(err, OsikatuError::InsufficientPoints { balance: 0, required: 30 }));

        let page = f.gacha.history("u1", &PaginationQuery::default()).await.unwrap();
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn test_ten_pull_requires_plan() {
        let f = fixture(GachaConfig::default());
        f.points.add("u1", 1000, "seed", None).await.unwrap();

        let err = f.gacha.draw("u1", 10, "req-aaaa-0001").await.unwrap_err();
        assert!(matches!(err, OsikatuError::PaymentRequired(_)));
        assert_eq!(f.points.balance("u1").await.unwrap(), 1000);

        upgrade(&f.billing, "u1", "premium").await;
        let result = f.gacha.draw("u1", 10, "req-aaaa-0002").await.unwrap();
        assert_eq!(result.items.len(), 10);
        assert_eq!(result.points_spent, 270);
        assert!(result.items.iter().any(|i| i.rarity >= Rarity::SR));
    }

    #[tokio::test]
    async fn test_daily_limit() {
        let f = fixture(GachaConfig::default());
        f.points.add("u1", 10_000, "seed", None).await.unwrap();

        for n in 0..10 {
            f.gacha.draw("u1", 1, &format!("req-daily-{:04}", n)).await.unwrap();
        }
        let err = f.gacha.draw("u1", 1, "req-daily-0010").await.unwrap_err();
        assert!(matches!(err, OsikatuError::TooManyRequests(_)));

        // a replay of an earlier request is still answered
        assert!(f.gacha.draw("u1", 1, "req-daily-0003").await.is_ok());
    }

    #[tokio::test]
    async fn test_pool_probabilities() {
        let config = GachaConfig {
            pool: GachaPool {
                items: vec![
                    GachaItem { id: "a".into(), name: "A".into(), rarity: Rarity::N, weight: 3 },
                    GachaItem { id: "b".into(), name: "B".into(), rarity: Rarity::SR, weight: 1 },
                ],
            },
            ..GachaConfig::default()
        };
        let f = fixture(config);
        let view = f.gacha.pool();
        assert_eq!(view.items[0].probability, 0.75);
        assert_eq!(view.items[1].probability, 0.25);
    }

    /// Reads work; every insert fails.
    struct BrokenStore(InMemoryGachaStore);

    #[async_trait::async_trait]
    impl GachaStore for BrokenStore {
        async fn insert(&self, _result: DrawResult, _limit: Option<DrawLimit>) -> Result<InsertOutcome> {
            Err(OsikatuError::internal("gacha store unavailable"))
        }

        async fn find_by_request(&self, user_id: &str, request_id: &str) -> Result<Option<DrawResult>> {
            self.0.find_by_request(user_id, request_id).await
        }

        async fn history(&self, user_id: &str) -> Result<Vec<DrawResult>> {
            self.0.history(user_id).await
        }

        async fn items_drawn_since(&self, user_id: &str, since: DateTime<Utc>) -> Result<u64> {
            self.0.items_drawn_since(user_id, since).await
        }
    }

    #[tokio::test]
    async fn test_failed_insert_refunds_the_charge() {
        let f = fixture_with_store(
            GachaConfig::default(),
            Arc::new(BrokenStore(InMemoryGachaStore::new())),
        );
        f.points.add("u1", 100, "seed", None).await.unwrap();

        let err = f.gacha.draw("u1", 1, "req-aaaa-0001").await.unwrap_err();
        assert!(matches!(err, OsikatuError::Internal(_)));
        assert_eq!(f.points.balance("u1").await.unwrap(), 100);

        // The spent request id is not charged again.
        let err = f.gacha.draw("u1", 1, "req-aaaa-0001").await.unwrap_err();
        assert!(matches!(err, OsikatuError::Conflict(_)));
        assert_eq!(f.points.balance("u1").await.unwrap(), 100);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_draws_respect_daily_limit() {
        let f = fixture(GachaConfig::default());
        f.points.add("u1", 10_000, "seed", None).await.unwrap();
        let gacha = Arc::new(f.gacha);

        let handles: Vec<_> = (0..24)
            .map(|n| {
                let gacha = gacha.clone();
                tokio::spawn(async move { gacha.draw("u1", 1, &format!("req-race-{:04}", n)).await })
            })
            .collect();
        let mut succeeded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(e) => assert!(matches!(e, OsikatuError::TooManyRequests(_))),
            }
        }

        assert_eq!(succeeded, 10);
        // Rejected draws cost nothing.
        assert_eq!(f.points.balance("u1").await.unwrap(), 10_000 - 10 * 30);
    }

    #[tokio::test]
    async fn test_invalid_count() {
        let f = fixture(GachaConfig::default());
        let err = f.gacha.draw("u1", 3, "req-aaaa-0001").await.unwrap_err();
        assert!(matches!(err, OsikatuError::Validation(_)));
    }
}
