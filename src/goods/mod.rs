//! Goods purchases, optionally mirrored as expenses.

mod routes;
mod service;

pub use routes::GoodsModule;
pub use service::GoodsService;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::oshi::OshiLinked;
use crate::store::Record;
use crate::validation::validate_not_blank;

pub const MAX_UNIT_PRICE: i64 = 10_000_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoodsCategory {
    AcrylicStand,
    Badge,
    Photo,
    Towel,
    Apparel,
    CdDvd,
    Book,
    #[default]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoodsItem {
    pub id: String,
    pub user_id: String,
    pub oshi_id: Option<String>,
    pub name: String,
    pub category: GoodsCategory,
    pub unit_price: i64,
    pub quantity: u32,
    pub purchased_on: NaiveDate,
    pub shop: Option<String>,
    pub memo: Option<String>,
    pub expense_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl GoodsItem {
    pub fn total_price(&self) -> i64 {
        self.unit_price.saturating_mul(i64::from(self.quantity))
    }
}

impl Record for GoodsItem {
    const KIND: &'static str = "Goods";

    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> &str {
        &self.user_id
    }
}

impl OshiLinked for GoodsItem {
    fn oshi_id_mut(&mut self) -> &mut Option<String> {
        &mut self.oshi_id
    }
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateGoodsRequest {
    pub oshi_id: Option<String>,
    #[validate(length(min = 1, max = 100), custom(function = "validate_not_blank"))]
    pub name: String,
    #[serde(default)]
    pub category: GoodsCategory,
    #[validate(range(min = 0, max = MAX_UNIT_PRICE))]
    pub unit_price: i64,
    #[serde(default = "default_quantity")]
    #[validate(range(min = 1, max = 999))]
    pub quantity: u32,
    /// Defaults to today (UTC).
    pub purchased_on: Option<NaiveDate>,
    #[validate(length(max = 100))]
    pub shop: Option<String>,
    #[validate(length(max = 500))]
    pub memo: Option<String>,
    /// Also record a `goods` expense for the total price.
    #[serde(default)]
    pub record_expense: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateGoodsRequest {
    pub oshi_id: Option<String>,
    #[validate(length(min = 1, max = 100), custom(function = "validate_not_blank"))]
    pub name: Option<String>,
    pub category: Option<GoodsCategory>,
    #[validate(range(min = 0, max = MAX_UNIT_PRICE))]
    pub unit_price: Option<i64>,
    #[validate(range(min = 1, max = 999))]
    pub quantity: Option<u32>,
    pub purchased_on: Option<NaiveDate>,
    #[validate(length(max = 100))]
    pub shop: Option<String>,
    #[validate(length(max = 500))]
    pub memo: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GoodsFilter {
    pub oshi_id: Option<String>,
    pub category: Option<GoodsCategory>,
}
