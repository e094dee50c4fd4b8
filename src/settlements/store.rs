use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Settlement, Transfer};
use crate::circles::CircleCleanup;
use crate::error::Result;

#[async_trait]
pub trait SettlementStore: Send + Sync {
    async fn insert_settlement(&self, settlement: Settlement) -> Result<Settlement>;

    async fn get_settlement(&self, circle_id: &str, settlement_id: &str) -> Result<Option<Settlement>>;

    /// In creation order
    async fn list_settlements(&self, circle_id: &str) -> Result<Vec<Settlement>>;

    async fn delete_settlement(&self, circle_id: &str, settlement_id: &str) -> Result<bool>;

    async fn insert_transfer(&self, transfer: Transfer) -> Result<Transfer>;

    /// In creation order
    async fn list_transfers(&self, circle_id: &str) -> Result<Vec<Transfer>>;

    /// Remove every settlement and transfer of the circle.
    async fn delete_circle(&self, circle_id: &str) -> Result<()>;
}

#[derive(Default)]
struct SettlementState {
    settlements: Vec<Settlement>,
    transfers: Vec<Transfer>,
}

#[derive(Clone, Default)]
pub struct InMemorySettlementStore {
    state: Arc<RwLock<SettlementState>>,
}

impl InMemorySettlementStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettlementStore for InMemorySettlementStore {
    async fn insert_settlement(&self, settlement: Settlement) -> Result<Settlement> {
        self.state.write().await.settlements.push(settlement.clone());
        Ok(settlement)
    }

    async fn get_settlement(&self, circle_id: &str, settlement_id: &str) -> Result<Option<Settlement>> {
        Ok(self
            .state
            .read()
            .await
            .settlements
            .iter()
            .find(|s| s.circle_id == circle_id && s.id == settlement_id)
            .cloned())
    }

    async fn list_settlements(&self, circle_id: &str) -> Result<Vec<Settlement>> {
        Ok(self
            .state
            .read()
            .await
            .settlements
            .iter()
            .filter(|s| s.circle_id == circle_id)
            .cloned()
            .collect())
    }

    async fn delete_settlement(&self, circle_id: &str, settlement_id: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        let before = state.settlements.len();
        state
            .settlements
            .retain(|s| !(s.circle_id == circle_id && s.id == settlement_id));
        Ok(state.settlements.len() < before)
    }

    async fn insert_transfer(&self, transfer: Transfer) -> Result<Transfer> {
        self.state.write().await.transfers.push(transfer.clone());
        Ok(transfer)
    }

    async fn list_transfers(&self, circle_id: &str) -> Result<Vec<Transfer>> {
        Ok(self
            .state
            .read()
            .await
            .transfers
            .iter()
            .filter(|t| t.circle_id == circle_id)
            .cloned()
            .collect())
    }

    async fn delete_circle(&self, circle_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.settlements.retain(|s| s.circle_id != circle_id);
        state.transfers.retain(|t| t.circle_id != circle_id);
        Ok(())
    }
}

/// Drops settlements and transfers of a deleted circle.
pub struct SettlementCleanup {
    store: Arc<dyn SettlementStore>,
}

impl SettlementCleanup {
    pub fn new(store: Arc<dyn SettlementStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CircleCleanup for SettlementCleanup {
    async fn purge_circle(&self, circle_id: &str) -> Result<()> {
        self.store.delete_circle(circle_id).await
    }
}
