//! Points: an append-only ledger behind personal and circle balances.

mod circle;
mod ledger;
mod routes;
mod service;

pub use circle::{CircleLedgerCleanup, CirclePointsService, Contribution};
pub use ledger::{
    AppliedBatch, InMemoryLedgerStore, LedgerAccount, LedgerEntry, LedgerError, LedgerStore,
    NewLedgerEntry,
};
pub use routes::{CirclePointsModule, PointsModule};
pub use service::{AddOutcome, PointsService};

use serde::{Deserialize, Serialize};

use crate::error::{OsikatuError, Result};
use crate::utils::get_env_parsed;

/// Bonus amounts granted by the points service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsConfig {
    /// One-time grant on registration
    #[serde(default = "default_signup_bonus")]
    pub signup_bonus: i64,
    #[serde(default = "default_daily_login_bonus")]
    pub daily_login_bonus: i64,
    /// Granted for the first diary entry of a day; 0 disables it
    #[serde(default = "default_diary_daily_bonus")]
    pub diary_daily_bonus: i64,
}

impl Default for PointsConfig {
    fn default() -> Self {
        Self {
            signup_bonus: default_signup_bonus(),
            daily_login_bonus: default_daily_login_bonus(),
            diary_daily_bonus: default_diary_daily_bonus(),
        }
    }
}

fn default_signup_bonus() -> i64 {
    300
}

fn default_daily_login_bonus() -> i64 {
    10
}

fn default_diary_daily_bonus() -> i64 {
    5
}

impl PointsConfig {
    /// Reads `POINTS_SIGNUP_BONUS`, `POINTS_DAILY_LOGIN_BONUS` and
    /// `POINTS_DIARY_DAILY_BONUS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = get_env_parsed("POINTS_SIGNUP_BONUS") {
            config.signup_bonus = v;
        }
        if let Some(v) = get_env_parsed("POINTS_DAILY_LOGIN_BONUS") {
            config.daily_login_bonus = v;
        }
        if let Some(v) = get_env_parsed("POINTS_DIARY_DAILY_BONUS") {
            config.diary_daily_bonus = v;
        }
        config
    }

    pub fn validate(&self) -> Result<()> {
        if self.signup_bonus < 0 || self.diary_daily_bonus < 0 {
            return Err(OsikatuError::bad_request("Point bonuses must not be negative"));
        }
        if self.daily_login_bonus <= 0 {
            return Err(OsikatuError::bad_request(
                "Daily login bonus must be greater than 0",
            ));
        }
        Ok(())
    }
}
