//! Append-only points ledger shared by user and circle balances.
//!
//! Every balance change is a [`LedgerEntry`]. A batch of entries is applied
//! atomically: either all entries are written or none are. Two guarantees
//! hold inside that critical section:
//!
//! - no account balance ever goes below zero
//! - the first entry's `(account, idempotency_key)` is unique; replaying a
//!   batch with a known key returns the entries written the first time

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::OsikatuError;

/// Whose balance an entry moves.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum LedgerAccount {
    User(String),
    Circle(String),
}

impl fmt::Display for LedgerAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{}", id),
            Self::Circle(id) => write!(f, "circle:{}", id),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    pub id: String,
    pub account: LedgerAccount,
    pub delta: i64,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    pub balance_after: i64,
    pub created_at: DateTime<Utc>,
}

/// An entry to be written.
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub account: LedgerAccount,
    pub delta: i64,
    pub reason: String,
    pub idempotency_key: Option<String>,
}

impl NewLedgerEntry {
    pub fn new(account: LedgerAccount, delta: i64, reason: impl Into<String>) -> Self {
        Self {
            account,
            delta,
            reason: reason.into(),
            idempotency_key: None,
        }
    }

    pub fn with_key(mut self, key: Option<String>) -> Self {
        self.idempotency_key = key;
        self
    }
}

/// Result of [`LedgerStore::apply`].
#[derive(Debug, Clone)]
pub struct AppliedBatch {
    pub entries: Vec<LedgerEntry>,
    /// `false` when the batch was a replay of an earlier idempotency key.
    pub created: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Insufficient balance on {account}: balance {balance}, required {required}")]
    Insufficient {
        account: LedgerAccount,
        balance: i64,
        required: i64,
    },

    #[error("Ledger amounts must be non-zero")]
    ZeroDelta,

    #[error("Ledger batch is empty")]
    EmptyBatch,

    #[error("Ledger storage error: {0}")]
    Storage(String),
}

impl From<LedgerError> for OsikatuError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Insufficient {
                balance, required, ..
            } => OsikatuError::InsufficientPoints { balance, required },
            LedgerError::ZeroDelta | LedgerError::EmptyBatch => {
                OsikatuError::validation("amount", err.to_string())
            }
            LedgerError::Storage(msg) => OsikatuError::internal(msg),
        }
    }
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Apply `batch` atomically. See the module docs for the guarantees.
    async fn apply(&self, batch: Vec<NewLedgerEntry>) -> Result<AppliedBatch, LedgerError>;

    async fn balance(&self, account: &LedgerAccount) -> Result<i64, LedgerError>;

    /// Entries of `account`, newest first.
    async fn history(&self, account: &LedgerAccount) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// Drop an account and its entries (used when a circle is deleted).
    async fn remove_account(&self, account: &LedgerAccount) -> Result<(), LedgerError>;
}

#[derive(Default)]
struct LedgerInner {
    entries: Vec<LedgerEntry>,
    balances: HashMap<LedgerAccount, i64>,
    /// (account, key) of a batch's first entry -> ids of every entry in that batch
    keys: HashMap<(LedgerAccount, String), Vec<String>>,
}

/// In-memory ledger. A single mutex serializes every batch, which plays the
/// role of a row lock on the balance rows.
#[derive(Clone, Default)]
pub struct InMemoryLedgerStore {
    inner: Arc<Mutex<LedgerInner>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn apply(&self, batch: Vec<NewLedgerEntry>) -> Result<AppliedBatch, LedgerError> {
        let first = batch.first().ok_or(LedgerError::EmptyBatch)?;
        if batch.iter().any(|e| e.delta == 0) {
            return Err(LedgerError::ZeroDelta);
        }

        let mut inner = self.inner.lock().await;

        let replay_key = first
            .idempotency_key
            .as_ref()
            .map(|key| (first.account.clone(), key.clone()));

        if let Some(ids) = replay_key.as_ref().and_then(|k| inner.keys.get(k)) {
            let entries = ids
                .iter()
                .filter_map(|id| inner.entries.iter().find(|e| &e.id == id))
                .cloned()
                .collect();
            return Ok(AppliedBatch {
                entries,
                created: false,
            });
        }

        let now = Utc::now();
        let mut pending: HashMap<LedgerAccount, i64> = HashMap::new();
        let mut written = Vec::with_capacity(batch.len());

        for entry in batch {
            let current = match pending.get(&entry.account) {
                Some(balance) => *balance,
                None => inner.balances.get(&entry.account).copied().unwrap_or(0),
            };
            let next = current + entry.delta;
            if next < 0 {
                return Err(LedgerError::Insufficient {
                    account: entry.account,
                    balance: current,
                    required: -entry.delta,
                });
            }
            pending.insert(entry.account.clone(), next);

            written.push(LedgerEntry {
                id: crate::utils::new_id(),
                account: entry.account,
                delta: entry.delta,
                reason: entry.reason,
                idempotency_key: entry.idempotency_key,
                balance_after: next,
                created_at: now,
            });
        }

        inner.balances.extend(pending);
        if let Some(key) = replay_key {
            inner
                .keys
                .insert(key, written.iter().map(|e| e.id.clone()).collect());
        }
        inner.entries.extend(written.iter().cloned());

        Ok(AppliedBatch {
            entries: written,
            created: true,
        })
    }

    async fn balance(&self, account: &LedgerAccount) -> Result<i64, LedgerError> {
        Ok(self
            .inner
            .lock()
            .await
            .balances
            .get(account)
            .copied()
            .unwrap_or(0))
    }

    async fn history(&self, account: &LedgerAccount) -> Result<Vec<LedgerEntry>, LedgerError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .entries
            .iter()
            .rev()
            .filter(|e| &e.account == account)
            .cloned()
            .collect())
    }

    async fn remove_account(&self, account: &LedgerAccount) -> Result<(), LedgerError> {
        let mut inner = self.inner.lock().await;
        inner.balances.remove(account);
        inner.entries.retain(|e| &e.account != account);
        inner.keys.retain(|(acct, _), _| acct != account);
        Ok(())
    }
}
