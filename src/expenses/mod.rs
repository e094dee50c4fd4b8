//! Money spent on oshi activities, in whole yen.

mod routes;
mod service;

pub use routes::ExpenseModule;
pub use service::ExpenseService;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::oshi::OshiLinked;
use crate::store::Record;
use crate::validation::validate_month;

pub const MAX_AMOUNT: i64 = 10_000_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseCategory {
    Goods,
    Ticket,
    Transport,
    Streaming,
    Gift,
    Event,
    #[default]
    Other,
}

impl ExpenseCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Goods => "goods",
            Self::Ticket => "ticket",
            Self::Transport => "transport",
            Self::Streaming => "streaming",
            Self::Gift => "gift",
            Self::Event => "event",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: String,
    pub user_id: String,
    pub oshi_id: Option<String>,
    pub category: ExpenseCategory,
    pub amount: i64,
    pub spent_on: NaiveDate,
    pub memo: Option<String>,
    /// Set when the expense was recorded together with a goods purchase.
    pub goods_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Record for Expense {
    const KIND: &'static str = "Expense";

    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> &str {
        &self.user_id
    }
}

impl OshiLinked for Expense {
    fn oshi_id_mut(&mut self) -> &mut Option<String> {
        &mut self.oshi_id
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateExpenseRequest {
    pub oshi_id: Option<String>,
    #[serde(default)]
    pub category: ExpenseCategory,
    #[validate(range(min = 1, max = MAX_AMOUNT))]
    pub amount: i64,
    /// Defaults to today (UTC).
    pub spent_on: Option<NaiveDate>,
    #[validate(length(max = 500))]
    pub memo: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateExpenseRequest {
    pub oshi_id: Option<String>,
    pub category: Option<ExpenseCategory>,
    #[validate(range(min = 1, max = MAX_AMOUNT))]
    pub amount: Option<i64>,
    pub spent_on: Option<NaiveDate>,
    #[validate(length(max = 500))]
    pub memo: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ExpenseFilter {
    #[validate(custom(function = "validate_month"))]
    pub month: Option<String>,
    pub oshi_id: Option<String>,
    pub category: Option<ExpenseCategory>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SummaryQuery {
    #[validate(custom(function = "validate_month"))]
    pub month: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryTotal {
    pub category: ExpenseCategory,
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OshiTotal {
    pub oshi_id: Option<String>,
    pub total: i64,
}

/// Totals for one calendar month
#[derive(Debug, Clone, Serialize)]
pub struct ExpenseSummary {
    pub month: String,
    pub total: i64,
    pub by_category: Vec<CategoryTotal>,
    pub by_oshi: Vec<OshiTotal>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_bounds() {
        let parse = |amount: i64| {
            serde_json::from_value::<CreateExpenseRequest>(serde_json::json!({ "amount": amount }))
                .unwrap()
        };
        assert!(parse(0).validate().is_err());
        assert!(parse(1).validate().is_ok());
        assert!(parse(MAX_AMOUNT).validate().is_ok());
        assert!(parse(MAX_AMOUNT + 1).validate().is_err());
    }

    #[test]
    fn test_filter_month_format() {
        let filter = ExpenseFilter {
            month: Some("2024/05".into()),
            ..Default::default()
        };
        assert!(filter.validate().is_err());
    }

    #[test]
    fn test_category_names_match_serde() {
        for category in [ExpenseCategory::Goods, ExpenseCategory::Streaming, ExpenseCategory::Other] {
            let json = serde_json::to_value(category).unwrap();
            assert_eq!(json, category.as_str());
        }
    }
}
