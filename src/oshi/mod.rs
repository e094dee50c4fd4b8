//! Oshi: the people and characters a user follows.
//!
//! Diary entries, expenses, goods and schedules may point at an oshi through
//! an optional `oshi_id`. Those records implement [`OshiLinked`] so that
//! deleting an oshi can detach them.

mod routes;
mod service;

pub use routes::OshiModule;
pub use service::{OshiDetacher, OshiReferences, OshiService, ensure_oshi_ref};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::store::Record;
use crate::validation::{validate_hex_color, validate_not_blank};

pub const DEFAULT_COLOR: &str = "#FF69B4";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OshiCategory {
    Idol,
    Actor,
    Vtuber,
    Musician,
    Athlete,
    Character,
    #[default]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Oshi {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub nickname: Option<String>,
    pub category: OshiCategory,
    pub color: String,
    pub birthday: Option<NaiveDate>,
    pub memo: Option<String>,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for Oshi {
    const KIND: &'static str = "Oshi";

    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> &str {
        &self.user_id
    }
}

/// A record that can reference an oshi.
pub trait OshiLinked: Record {
    fn oshi_id_mut(&mut self) -> &mut Option<String>;
}

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateOshiRequest {
    #[validate(length(min = 1, max = 50), custom(function = "validate_not_blank"))]
    pub name: String,
    #[validate(length(max = 50))]
    pub nickname: Option<String>,
    #[serde(default)]
    pub category: OshiCategory,
    #[serde(default = "default_color")]
    #[validate(custom(function = "validate_hex_color"))]
    pub color: String,
    pub birthday: Option<NaiveDate>,
    #[validate(length(max = 1000))]
    pub memo: Option<String>,
}

/// Partial update. An empty `nickname` or `memo` clears the field.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateOshiRequest {
    #[validate(length(min = 1, max = 50), custom(function = "validate_not_blank"))]
    pub name: Option<String>,
    #[validate(length(max = 50))]
    pub nickname: Option<String>,
    pub category: Option<OshiCategory>,
    #[validate(custom(function = "validate_hex_color"))]
    pub color: Option<String>,
    pub birthday: Option<NaiveDate>,
    #[validate(length(max = 1000))]
    pub memo: Option<String>,
}

/// Trim and map an empty string to `None`.
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
