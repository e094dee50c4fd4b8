use std::sync::Arc;

use serde_json::json;
use tracing::{info, instrument};

use super::calculator;
use super::{
    Balance, CreateSettlementRequest, RecordTransferRequest, Settlement, SettlementStore,
    SplitMode, Suggestion, Transfer,
};
use crate::circles::{CircleRole, CircleService};
use crate::error::{OsikatuError, Result};
use crate::oplog::{NewOperation, OperationLogger};
use crate::oshi::non_empty;

pub struct SettlementService {
    store: Arc<dyn SettlementStore>,
    circles: Arc<CircleService>,
    oplog: Arc<OperationLogger>,
}

impl SettlementService {
    pub fn new(
        store: Arc<dyn SettlementStore>,
        circles: Arc<CircleService>,
        oplog: Arc<OperationLogger>,
    ) -> Self {
        Self {
            store,
            circles,
            oplog,
        }
    }

    /// Everyone named must currently be in the circle.
    fn ensure_members<'a>(members: &[String], users: impl IntoIterator<Item = &'a String>) -> Result<()> {
        for user_id in users {
            if !members.contains(user_id) {
                return Err(OsikatuError::bad_request(format!(
                    "User {} is not a member of this circle",
                    user_id
                )));
            }
        }
        Ok(())
    }

    #[instrument(skip(self, request))]
    pub async fn create(
        &self,
        circle_id: &str,
        actor_id: &str,
        request: CreateSettlementRequest,
    ) -> Result<Settlement> {
        self.circles.require_member(circle_id, actor_id).await?;
        let members = self.circles.member_ids(circle_id).await?;

        let payer_id = request.payer_id.unwrap_or_else(|| actor_id.to_string());
        let shares = match request.split_mode {
            SplitMode::Equal => calculator::split_equal(request.total_amount, &request.participants)?,
            SplitMode::Custom => calculator::validate_custom_shares(request.total_amount, &request.shares)?,
        };
        Self::ensure_members(
            &members,
            std::iter::once(&payer_id).chain(shares.iter().map(|s| &s.user_id)),
        )?;

        let settlement = self
            .store
            .insert_settlement(Settlement {
                id: crate::utils::new_id(),
                circle_id: circle_id.to_string(),
                title: request.title.trim().to_string(),
                total_amount: request.total_amount,
                payer_id,
                shares,
                split_mode: request.split_mode,
                memo: non_empty(request.memo),
                created_by: actor_id.to_string(),
                created_at: crate::utils::now(),
            })
            .await?;

        info!(settlement_id = %settlement.id, total = settlement.total_amount, "Settlement created");
        self.oplog
            .record(
                NewOperation::new("settlement.create")
                    .actor(actor_id)
                    .target("settlement", &settlement.id)
                    .metadata(json!({
                        "circle_id": circle_id,
                        "total_amount": settlement.total_amount,
                        "split_mode": settlement.split_mode,
                    })),
            )
            .await;
        Ok(settlement)
    }

    /// Newest first.
    pub async fn list(&self, circle_id: &str, actor_id: &str) -> Result<Vec<Settlement>> {
        self.circles.require_member(circle_id, actor_id).await?;
        let mut settlements = self.store.list_settlements(circle_id).await?;
        settlements.reverse();
        Ok(settlements)
    }

    pub async fn get(&self, circle_id: &str, actor_id: &str, settlement_id: &str) -> Result<Settlement> {
        self.circles.require_member(circle_id, actor_id).await?;
        self.store
            .get_settlement(circle_id, settlement_id)
            .await?
            .ok_or_else(|| OsikatuError::not_found("Settlement not found"))
    }

    /// The creator or an admin.
    #[instrument(skip(self))]
    pub async fn delete(&self, circle_id: &str, actor_id: &str, settlement_id: &str) -> Result<()> {
        let membership = self.circles.require_member(circle_id, actor_id).await?;
        let settlement = self
            .store
            .get_settlement(circle_id, settlement_id)
            .await?
            .ok_or_else(|| OsikatuError::not_found("Settlement not found"))?;

        if settlement.created_by != actor_id && !membership.role.has_at_least(&CircleRole::Admin) {
            return Err(OsikatuError::forbidden(
                "Only the creator or an admin can delete this settlement",
            ));
        }

        self.store.delete_settlement(circle_id, settlement_id).await?;
        info!(settlement_id, "Settlement deleted");
        self.oplog
            .record(
                NewOperation::new("settlement.delete")
                    .actor(actor_id)
                    .target("settlement", settlement_id)
                    .metadata(json!({ "circle_id": circle_id })),
            )
            .await;
        Ok(())
    }

    /// Record a repayment. The caller must be one of the two parties or an admin.
    #[instrument(skip(self, request))]
    pub async fn record_transfer(
        &self,
        circle_id: &str,
        actor_id: &str,
        request: RecordTransferRequest,
    ) -> Result<Transfer> {
        let membership = self.circles.require_member(circle_id, actor_id).await?;
        if request.amount <= 0 {
            return Err(OsikatuError::validation("amount", "must be positive"));
        }

        let from_user_id = request.from_user_id.unwrap_or_else(|| actor_id.to_string());
        let to_user_id = request.to_user_id;
        if from_user_id == to_user_id {
            return Err(OsikatuError::validation(
                "to_user_id",
                "must differ from the sender",
            ));
        }

        let party = actor_id == from_user_id || actor_id == to_user_id;
        if !party && !membership.role.has_at_least(&CircleRole::Admin) {
            return Err(OsikatuError::forbidden(
                "Only the sender, the receiver or an admin can record this transfer",
            ));
        }

        let members = self.circles.member_ids(circle_id).await?;
        Self::ensure_members(&members, [&from_user_id, &to_user_id])?;

        let transfer = self
            .store
            .insert_transfer(Transfer {
                id: crate::utils::new_id(),
                circle_id: circle_id.to_string(),
                from_user_id,
                to_user_id,
                amount: request.amount,
                created_by: actor_id.to_string(),
                created_at: crate::utils::now(),
            })
            .await?;

        info!(transfer_id = %transfer.id, amount = transfer.amount, "Transfer recorded");
        self.oplog
            .record(
                NewOperation::new("settlement.transfer")
                    .actor(actor_id)
                    .target("transfer", &transfer.id)
                    .metadata(json!({
                        "circle_id": circle_id,
                        "from_user_id": transfer.from_user_id,
                        "to_user_id": transfer.to_user_id,
                        "amount": transfer.amount,
                    })),
            )
            .await;
        Ok(transfer)
    }

    /// Newest first.
    pub async fn list_transfers(&self, circle_id: &str, actor_id: &str) -> Result<Vec<Transfer>> {
        self.circles.require_member(circle_id, actor_id).await?;
        let mut transfers = self.store.list_transfers(circle_id).await?;
        transfers.reverse();
        Ok(transfers)
    }

    pub async fn balances(&self, circle_id: &str, actor_id: &str) -> Result<Vec<Balance>> {
        self.circles.require_member(circle_id, actor_id).await?;
        let members = self.circles.member_ids(circle_id).await?;
        let settlements = self.store.list_settlements(circle_id).await?;
        let transfers = self.store.list_transfers(circle_id).await?;
        Ok(calculator::balances(&members, &settlements, &transfers))
    }

    pub async fn suggestions(&self, circle_id: &str, actor_id: &str) -> Result<Vec<Suggestion>> {
        let balances = self.balances(circle_id, actor_id).await?;
        Ok(calculator::suggestions(&balances))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::InMemoryUserStore;
    use crate::billing::{EntitlementsManager, InMemoryBillingStore, Plans};
    use crate::circles::{CreateCircleRequest, InMemoryCircleStore};
    use crate::oplog::{InMemoryOperationLogStore, RedactionPolicy};
    use crate::settlements::{InMemorySettlementStore, SettlementCleanup};

    struct Fixture {
        settlements: SettlementService,
        circles: Arc<CircleService>,
        circle_id: String,
    }

    /// `owner`, `alice` and `bob` share one circle.
    async fn fixture() -> Fixture {
        let oplog = Arc::new(OperationLogger::new(
            Arc::new(InMemoryOperationLogStore::new()),
            RedactionPolicy::default(),
        ));
        let entitlements = Arc::new(EntitlementsManager::new(
            Arc::new(InMemoryBillingStore::new()),
            Plans::standard(None, None),
        ));
        let store: Arc<dyn SettlementStore> = Arc::new(InMemorySettlementStore::new());
        let circles = Arc::new(
            CircleService::new(
                Arc::new(InMemoryCircleStore::new()),
                Arc::new(InMemoryUserStore::new()),
                entitlements,
                oplog.clone(),
            )
            .with_cleanup(Arc::new(SettlementCleanup::new(store.clone()))),
        );
        let circle = circles
            .create(
                "owner",
                CreateCircleRequest {
                    name: "Expedition".into(),
                    description: None,
                    is_public: false,
                },
            )
            .await
            .unwrap();
        let code = circle.invite_code.clone().unwrap();
        circles.join("alice", &code).await.unwrap();
        circles.join("bob", &code).await.unwrap();

        Fixture {
            settlements: SettlementService::new(store, circles.clone(), oplog),
            circles,
            circle_id: circle.id,
        }
    }

    fn equal(total: i64, participants: &[&str]) -> CreateSettlementRequest {
        serde_json::from_value(json!({
            "title": "Hotel",
            "total_amount": total,
            "participants": participants,
        }))
        .unwrap()
    }

    fn transfer(from: Option<&str>, to: &str, amount: i64) -> RecordTransferRequest {
        RecordTransferRequest {
            from_user_id: from.map(str::to_string),
            to_user_id: to.into(),
            amount,
        }
    }

    #[tokio::test]
    async fn test_equal_settlement_and_balances() {
        let f = fixture().await;
        let settlement = f
            .settlements
            .create(&f.circle_id, "alice", equal(10_000, &["alice", "bob", "owner"]))
            .await
            .unwrap();
        assert_eq!(settlement.payer_id, "alice");
        assert_eq!(settlement.shares[0].amount, 3334);

        let balances = f.settlements.balances(&f.circle_id, "bob").await.unwrap();
        let nets: Vec<_> = balances.iter().map(|b| (b.user_id.as_str(), b.net)).collect();
        assert_eq!(nets, vec![("alice", 6666), ("bob", -3333), ("owner", -3333)]);

        let plan = f.settlements.suggestions(&f.circle_id, "bob").await.unwrap();
        assert_eq!(plan.len(), 2);
        assert!(plan.iter().all(|s| s.to_user_id == "alice"));
    }

    #[tokio::test]
    async fn test_transfers_settle_balances() {
        let f = fixture().await;
        f.settlements
            .create(&f.circle_id, "alice", equal(3000, &["alice", "bob", "owner"]))
            .await
            .unwrap();

        for s in f.settlements.suggestions(&f.circle_id, "alice").await.unwrap() {
            f.settlements
                .record_transfer(
                    &f.circle_id,
                    &s.from_user_id,
                    transfer(None, &s.to_user_id, s.amount),
                )
                .await
                .unwrap();
        }

        let balances = f.settlements.balances(&f.circle_id, "alice").await.unwrap();
        assert!(balances.iter().all(|b| b.net == 0));
        assert!(f.settlements.suggestions(&f.circle_id, "alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_participants_must_be_members() {
        let f = fixture().await;
        let err = f
            .settlements
            .create(&f.circle_id, "alice", equal(1000, &["alice", "mallory"]))
            .await
            .unwrap_err();
        assert!(matches!(err, OsikatuError::BadRequest(_)));

        let err = f
            .settlements
            .create(&f.circle_id, "mallory", equal(1000, &["alice"]))
            .await
            .unwrap_err();
        assert!(matches!(err, OsikatuError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_custom_split_must_add_up() {
        let f = fixture().await;
        let request = |bob: i64| -> CreateSettlementRequest {
            serde_json::from_value(json!({
                "title": "Tickets",
                "total_amount": 12_000,
                "split_mode": "custom",
                "shares": [
                    { "user_id": "alice", "amount": 8000 },
                    { "user_id": "bob", "amount": bob },
                ],
            }))
            .unwrap()
        };

        let err = f
            .settlements
            .create(&f.circle_id, "alice", request(3000))
            .await
            .unwrap_err();
        assert!(matches!(err, OsikatuError::Validation(_)));

        let settlement = f
            .settlements
            .create(&f.circle_id, "alice", request(4000))
            .await
            .unwrap();
        assert_eq!(settlement.split_mode, SplitMode::Custom);
    }

    #[tokio::test]
    async fn test_delete_permissions() {
        let f = fixture().await;
        let settlement = f
            .settlements
            .create(&f.circle_id, "alice", equal(1000, &["alice", "bob"]))
            .await
            .unwrap();

        let err = f
            .settlements
            .delete(&f.circle_id, "bob", &settlement.id)
            .await
            .unwrap_err();
        assert!(matches!(err, OsikatuError::Forbidden(_)));

        f.settlements
            .delete(&f.circle_id, "owner", &settlement.id)
            .await
            .unwrap();
        assert!(matches!(
            f.settlements.get(&f.circle_id, "alice", &settlement.id).await,
            Err(OsikatuError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_transfer_rules() {
        let f = fixture().await;

        let err = f
            .settlements
            .record_transfer(&f.circle_id, "alice", transfer(None, "alice", 100))
            .await
            .unwrap_err();
        assert!(matches!(err, OsikatuError::Validation(_)));

        // a bystander member cannot record a transfer between others
        let err = f
            .settlements
            .record_transfer(&f.circle_id, "bob", transfer(Some("alice"), "owner", 100))
            .await
            .unwrap_err();
        assert!(matches!(err, OsikatuError::Forbidden(_)));

        // the owner can
        f.settlements
            .record_transfer(&f.circle_id, "owner", transfer(Some("alice"), "bob", 100))
            .await
            .unwrap();

        let err = f
            .settlements
            .record_transfer(&f.circle_id, "alice", transfer(None, "mallory", 100))
            .await
            .unwrap_err();
        assert!(matches!(err, OsikatuError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_left_member_with_debt_stays_in_balances() {
        let f = fixture().await;
        f.settlements
            .create(&f.circle_id, "alice", equal(2000, &["alice", "bob"]))
            .await
            .unwrap();
        f.circles.leave("bob", &f.circle_id).await.unwrap();

        let balances = f.settlements.balances(&f.circle_id, "alice").await.unwrap();
        let bob = balances.iter().find(|b| b.user_id == "bob").unwrap();
        assert_eq!(bob.net, -1000);
    }

    #[tokio::test]
    async fn test_circle_delete_purges_settlements() {
        let f = fixture().await;
        f.settlements
            .create(&f.circle_id, "alice", equal(2000, &["alice", "bob"]))
            .await
            .unwrap();
        f.circles.delete("owner", &f.circle_id).await.unwrap();
        assert!(f.settlements.list(&f.circle_id, "alice").await.is_err());
    }
}
