//! Gacha: weighted draws paid with points.
//!
//! The pool comes from configuration. A draw picks items by weight, charges
//! the caller's points under an idempotency key derived from the client's
//! request id and stores the result in the draw history.

mod pool;
mod routes;
mod service;
mod store;

pub use pool::{draw_items, pick};
pub use routes::GachaModule;
pub use service::GachaService;
pub use store::{DrawLimit, GachaStore, InMemoryGachaStore, InsertOutcome};

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{OsikatuError, Result};
use crate::utils::{get_env_parsed, get_env_with_prefix};

/// Draws per request for a single pull and a ten-pull.
pub const SINGLE: u32 = 1;
pub const TEN_PULL: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Rarity {
    N,
    R,
    SR,
    SSR,
}

impl Rarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::N => "N",
            Self::R => "R",
            Self::SR => "SR",
            Self::SSR => "SSR",
        }
    }
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rarity {
    type Err = OsikatuError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "N" => Ok(Self::N),
            "R" => Ok(Self::R),
            "SR" => Ok(Self::SR),
            "SSR" => Ok(Self::SSR),
            other => Err(OsikatuError::bad_request(format!("Unknown rarity: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GachaItem {
    pub id: String,
    pub name: String,
    pub rarity: Rarity,
    pub weight: u32,
}

/// The drawable items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GachaPool {
    pub items: Vec<GachaItem>,
}

impl GachaPool {
    pub fn total_weight(&self) -> u64 {
        self.items.iter().map(|i| u64::from(i.weight)).sum()
    }

    /// Items at or above `rarity`, weights untouched.
    pub fn at_least(&self, rarity: Rarity) -> Vec<&GachaItem> {
        self.items.iter().filter(|i| i.rarity >= rarity).collect()
    }

    /// Non-empty, positive weights, unique ids.
    pub fn validate(&self) -> Result<()> {
        if self.items.is_empty() {
            return Err(OsikatuError::bad_request("Gacha pool must not be empty"));
        }
        let mut ids = HashSet::new();
        for item in &self.items {
            if item.weight == 0 {
                return Err(OsikatuError::bad_request(format!(
                    "Gacha item {} must have a positive weight",
                    item.id
                )));
            }
            if !ids.insert(item.id.as_str()) {
                return Err(OsikatuError::bad_request(format!(
                    "Duplicate gacha item id: {}",
                    item.id
                )));
            }
        }
        Ok(())
    }
}

impl Default for GachaPool {
    fn default() -> Self {
        let item = |id: &str, name: &str, rarity, weight| GachaItem {
            id: id.to_string(),
            name: name.to_string(),
            rarity,
            weight,
        };
        Self {
            items: vec![
                item("sticker-basic", "Sticker", Rarity::N, 400),
                item("badge-basic", "Can badge", Rarity::N, 300),
                item("frame-pastel", "Pastel frame", Rarity::R, 150),
                item("theme-stage", "Stage theme", Rarity::R, 100),
                item("voice-greeting", "Greeting voice", Rarity::SR, 40),
                item("card-signed", "Signed card", Rarity::SSR, 10),
            ],
        }
    }
}

/// Costs and pool of the gacha
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GachaConfig {
    #[serde(default = "default_single_cost")]
    pub single_cost: i64,
    #[serde(default = "default_ten_pull_cost")]
    pub ten_pull_cost: i64,
    /// A ten-pull always contains at least one item of this rarity or above
    #[serde(default = "default_guaranteed_rarity")]
    pub guaranteed_rarity: Rarity,
    #[serde(default)]
    pub pool: GachaPool,
}

impl Default for GachaConfig {
    fn default() -> Self {
        Self {
            single_cost: default_single_cost(),
            ten_pull_cost: default_ten_pull_cost(),
            guaranteed_rarity: default_guaranteed_rarity(),
            pool: GachaPool::default(),
        }
    }
}

fn default_single_cost() -> i64 {
    30
}

fn default_ten_pull_cost() -> i64 {
    270
}

fn default_guaranteed_rarity() -> Rarity {
    Rarity::SR
}

impl GachaConfig {
    /// Reads `GACHA_SINGLE_COST`, `GACHA_TEN_PULL_COST`,
    /// `GACHA_GUARANTEED_RARITY` and `GACHA_POOL_FILE` (a JSON
    /// [`GachaPool`]).
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(cost) = get_env_parsed("GACHA_SINGLE_COST") {
            config.single_cost = cost;
        }
        if let Some(cost) = get_env_parsed("GACHA_TEN_PULL_COST") {
            config.ten_pull_cost = cost;
        }
        if let Some(rarity) = get_env_with_prefix("GACHA_GUARANTEED_RARITY") {
            config.guaranteed_rarity = rarity.parse()?;
        }
        if let Some(path) = get_env_with_prefix("GACHA_POOL_FILE") {
            config.pool = Self::load_pool(&path)?;
        }
        Ok(config)
    }

    fn load_pool(path: &str) -> Result<GachaPool> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            OsikatuError::bad_request(format!("Cannot read gacha pool file {}: {}", path, e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            OsikatuError::bad_request(format!("Invalid gacha pool file {}: {}", path, e))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.single_cost <= 0 || self.ten_pull_cost <= 0 {
            return Err(OsikatuError::bad_request("Gacha costs must be greater than 0"));
        }
        self.pool.validate()?;
        if self.pool.at_least(self.guaranteed_rarity).is_empty() {
            return Err(OsikatuError::bad_request(format!(
                "Gacha pool has no item of guaranteed rarity {} or above",
                self.guaranteed_rarity
            )));
        }
        Ok(())
    }

    pub fn cost(&self, count: u32) -> i64 {
        if count == TEN_PULL {
            self.ten_pull_cost
        } else {
            self.single_cost * i64::from(count)
        }
    }
}

/// Pool entry as shown to clients
#[derive(Debug, Clone, Serialize)]
pub struct PoolEntry {
    #[serde(flatten)]
    pub item: GachaItem,
    pub probability: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolView {
    pub single_cost: i64,
    pub ten_pull_cost: i64,
    pub guaranteed_rarity: Rarity,
    pub items: Vec<PoolEntry>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DrawRequest {
    #[serde(default = "default_count")]
    #[validate(custom(function = "validate_draw_count"))]
    pub count: u32,
    /// Client-generated; replaying it returns the first result.
    #[validate(length(min = 8, max = 64))]
    pub request_id: String,
}

fn default_count() -> u32 {
    SINGLE
}

fn validate_draw_count(count: u32) -> std::result::Result<(), validator::ValidationError> {
    if count == SINGLE || count == TEN_PULL {
        Ok(())
    } else {
        let mut err = validator::ValidationError::new("draw_count");
        err.message = Some("must be 1 or 10".into());
        Err(err)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrawResult {
    pub id: String,
    pub user_id: String,
    pub request_id: String,
    pub items: Vec<GachaItem>,
    pub points_spent: i64,
    pub created_at: DateTime<Utc>,
}
