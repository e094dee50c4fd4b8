use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, instrument};

use super::PointsConfig;
use super::ledger::{LedgerAccount, LedgerEntry, LedgerStore, NewLedgerEntry};
use crate::error::{OsikatuError, Result};
use crate::http::{PaginatedData, PaginationQuery};
use crate::oplog::{NewOperation, OperationLogger};

/// Result of an idempotent ledger write.
#[derive(Debug, Clone, Serialize)]
pub struct AddOutcome {
    pub entry: LedgerEntry,
    /// `false` when the idempotency key had already been used.
    pub created: bool,
}

/// Personal point balances
pub struct PointsService {
    ledger: Arc<dyn LedgerStore>,
    config: PointsConfig,
    oplog: Arc<OperationLogger>,
}

impl PointsService {
    pub fn new(ledger: Arc<dyn LedgerStore>, config: PointsConfig, oplog: Arc<OperationLogger>) -> Self {
        Self {
            ledger,
            config,
            oplog,
        }
    }

    pub fn config(&self) -> &PointsConfig {
        &self.config
    }

    /// Credit `amount` points. Replaying `key` returns the original entry.
    #[instrument(skip(self, reason))]
    pub async fn add(
        &self,
        user_id: &str,
        amount: i64,
        reason: &str,
        key: Option<String>,
    ) -> Result<AddOutcome> {
        ensure_positive(amount)?;
        self.write(user_id, amount, reason, key, "points.add").await
    }

    /// Debit `amount` points; `InsufficientPoints` when the balance is too low.
    pub async fn deduct(
        &self,
        user_id: &str,
        amount: i64,
        reason: &str,
        key: Option<String>,
    ) -> Result<LedgerEntry> {
        self.spend(user_id, amount, reason, key).await.map(|o| o.entry)
    }

    /// [`deduct`](Self::deduct) that also reports whether the key was a replay.
    #[instrument(skip(self, reason))]
    pub async fn spend(
        &self,
        user_id: &str,
        amount: i64,
        reason: &str,
        key: Option<String>,
    ) -> Result<AddOutcome> {
        ensure_positive(amount)?;
        self.write(user_id, -amount, reason, key, "points.deduct").await
    }

    pub async fn balance(&self, user_id: &str) -> Result<i64> {
        Ok(self.ledger.balance(&account(user_id)).await?)
    }

    pub async fn history(
        &self,
        user_id: &str,
        page: &PaginationQuery,
    ) -> Result<PaginatedData<LedgerEntry>> {
        page.validate()?;
        let entries = self.ledger.history(&account(user_id)).await?;
        Ok(PaginatedData::from_vec(entries, page))
    }

    /// Once per calendar day.
    pub async fn claim_daily_bonus(&self, user_id: &str, today: NaiveDate) -> Result<AddOutcome> {
        self.add(
            user_id,
            self.config.daily_login_bonus,
            "daily login bonus",
            Some(format!("daily-bonus:{}", today)),
        )
        .await
    }

    /// Bonus for the first diary entry written on `date`. `None` when disabled.
    pub async fn grant_diary_bonus(&self, user_id: &str, date: NaiveDate) -> Result<Option<AddOutcome>> {
        if self.config.diary_daily_bonus == 0 {
            return Ok(None);
        }
        self.add(
            user_id,
            self.config.diary_daily_bonus,
            "diary daily bonus",
            Some(format!("diary-bonus:{}", date)),
        )
        .await
        .map(Some)
    }

    pub async fn grant_signup_bonus(&self, user_id: &str) -> Result<()> {
        if self.config.signup_bonus > 0 {
            self.add(
                user_id,
                self.config.signup_bonus,
                "signup bonus",
                Some("signup-bonus".to_string()),
            )
            .await?;
        }
        Ok(())
    }

    async fn write(
        &self,
        user_id: &str,
        delta: i64,
        reason: &str,
        key: Option<String>,
        action: &str,
    ) -> Result<AddOutcome> {
        let applied = self
            .ledger
            .apply(vec![NewLedgerEntry::new(account(user_id), delta, reason).with_key(key)])
            .await?;

        let entry = applied
            .entries
            .into_iter()
            .next()
            .ok_or_else(|| OsikatuError::internal("Ledger returned no entries"))?;

        if applied.created {
            info!(user_id, delta, balance = entry.balance_after, "Points updated");
            self.oplog
                .record(
                    NewOperation::new(action)
                        .actor(user_id)
                        .target("ledger_entry", &entry.id)
                        .metadata(json!({ "delta": delta, "reason": reason })),
                )
                .await;
        } else {
            debug!(user_id, key = ?entry.idempotency_key, "Points write replayed");
        }

        Ok(AddOutcome {
            entry,
            created: applied.created,
        })
    }
}

fn account(user_id: &str) -> LedgerAccount {
    LedgerAccount::User(user_id.to_string())
}

pub(crate) fn ensure_positive(amount: i64) -> Result<()> {
    if amount <= 0 {
        return Err(OsikatuError::validation("amount", "must be greater than 0"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oplog::{InMemoryOperationLogStore, RedactionPolicy};
    use crate::points::InMemoryLedgerStore;

    fn service() -> PointsService {
        let oplog = Arc::new(OperationLogger::new(
            Arc::new(InMemoryOperationLogStore::new()),
            RedactionPolicy::default(),
        ));
        PointsService::new(Arc::new(InMemoryLedgerStore::new()), PointsConfig::default(), oplog)
    }

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_add_is_idempotent_by_key() {
        let points = service();
        let first = points.add("u1", 50, "event", Some("evt-1".into())).await.unwrap();
        let again = points.add("u1", 50, "event", Some("evt-1".into())).await.unwrap();

        assert!(first.created);
        assert!(!again.created);
        assert_eq!(first.entry.id, again.entry.id);
        assert_eq!(points.balance("u1").await.unwrap(), 50);
    }

    #[tokio::test]
    async fn test_add_without_key_always_writes() {
        let points = service();
        points.add("u1", 5, "a", None).await.unwrap();
        points.add("u1", 5, "a", None).await.unwrap();
        assert_eq!(points.balance("u1").await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_deduct_insufficient() {
        let points = service();
        points.add("u1", 20, "grant", None).await.unwrap();

        let err = points.deduct("u1", 30, "gacha", None).await.unwrap_err();
        assert!(matches!(
            err,
            OsikatuError::InsufficientPoints { balance: 20, required: 30 }
        ));

        let entry = points.deduct("u1", 20, "gacha", None).await.unwrap();
        assert_eq!(entry.delta, -20);
        assert_eq!(entry.balance_after, 0);
    }

    #[tokio::test]
    async fn test_non_positive_amounts_rejected() {
        let points = service();
        assert!(matches!(
            points.add("u1", 0, "x", None).await.unwrap_err(),
            OsikatuError::Validation(_)
        ));
        assert!(matches!(
            points.deduct("u1", -5, "x", None).await.unwrap_err(),
            OsikatuError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn test_daily_bonus_once_per_day() {
        let points = service();
        let first = points.claim_daily_bonus("u1", day("2024-05-01")).await.unwrap();
        let again = points.claim_daily_bonus("u1", day("2024-05-01")).await.unwrap();
        let next_day = points.claim_daily_bonus("u1", day("2024-05-02")).await.unwrap();

        assert!(first.created);
        assert!(!again.created);
        assert!(next_day.created);
        assert_eq!(
            points.balance("u1").await.unwrap(),
            2 * PointsConfig::default().daily_login_bonus
        );
    }

    #[tokio::test]
    async fn test_history_newest_first() {
        let points = service();
        points.add("u1", 1, "first", None).await.unwrap();
        points.add("u1", 2, "second", None).await.unwrap();

        let page = points.history("u1", &PaginationQuery::default()).await.unwrap();
        assert_eq!(page.items[0].reason, "second");
        assert_eq!(page.items[1].reason, "first");
        assert_eq!(page.pagination.total, 2);
    }

    #[tokio::test]
    async fn test_signup_bonus_granted_once() {
        let points = service();
        points.grant_signup_bonus("u1").await.unwrap();
        points.grant_signup_bonus("u1").await.unwrap();
        assert_eq!(
            points.balance("u1").await.unwrap(),
            PointsConfig::default().signup_bonus
        );
    }
}
