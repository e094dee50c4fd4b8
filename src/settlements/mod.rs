//! Bill splitting among circle members.
//!
//! A [`Settlement`] records who paid for something and how the cost is
//! shared. A [`Transfer`] records a repayment between two members. Both feed
//! the per-member [`Balance`]s, from which [`calculator::suggestions`]
//! derives a short list of repayments that settles everyone.

pub mod calculator;
mod routes;
mod service;
mod store;

pub use calculator::{balances, split_equal, suggestions, validate_custom_shares};
pub use routes::SettlementModule;
pub use service::SettlementService;
pub use store::{InMemorySettlementStore, SettlementCleanup, SettlementStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation::validate_not_blank;

pub const MAX_TOTAL: i64 = 10_000_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitMode {
    #[default]
    Equal,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    pub user_id: String,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settlement {
    pub id: String,
    pub circle_id: String,
    pub title: String,
    pub total_amount: i64,
    pub payer_id: String,
    pub shares: Vec<Share>,
    pub split_mode: SplitMode,
    pub memo: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transfer {
    pub id: String,
    pub circle_id: String,
    pub from_user_id: String,
    pub to_user_id: String,
    pub amount: i64,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// `net = paid - owed`; positive means the member is owed money.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Balance {
    pub user_id: String,
    pub paid: i64,
    pub owed: i64,
    pub net: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub from_user_id: String,
    pub to_user_id: String,
    pub amount: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateSettlementRequest {
    #[validate(length(min = 1, max = 100), custom(function = "validate_not_blank"))]
    pub title: String,
    #[validate(range(min = 1, max = MAX_TOTAL))]
    pub total_amount: i64,
    /// Defaults to the caller.
    pub payer_id: Option<String>,
    #[serde(default)]
    pub split_mode: SplitMode,
    /// Equal split: who shares the cost.
    #[serde(default)]
    pub participants: Vec<String>,
    /// Custom split: explicit amounts.
    #[serde(default)]
    pub shares: Vec<Share>,
    #[validate(length(max = 500))]
    pub memo: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RecordTransferRequest {
    /// Defaults to the caller.
    pub from_user_id: Option<String>,
    #[validate(length(min = 1))]
    pub to_user_id: String,
    #[validate(range(min = 1, max = MAX_TOTAL))]
    pub amount: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let req: CreateSettlementRequest = serde_json::from_str(
            r#"{"title":"Hotel","total_amount":30000,"participants":["a","b"]}"#,
        )
        .unwrap();
        assert_eq!(req.split_mode, SplitMode::Equal);
        assert!(req.payer_id.is_none());
        assert!(req.shares.is_empty());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_total_bounds() {
        let req: CreateSettlementRequest =
            serde_json::from_str(r#"{"title":"x","total_amount":0}"#).unwrap();
        assert!(req.validate().is_err());
    }
}
